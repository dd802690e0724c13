//! Local file fetcher

use std::io::ErrorKind as IoErrorKind;

use contracts::{FetchError, Fetched, Fetcher, LoadedFrom, Locator, NetworkPolicy};
use tracing::trace;

/// Reads plain files from disk
///
/// The file length reported by the filesystem is the advertised length; a
/// file that changes size while being read yields
/// [`FetchError::ContentLengthMismatch`].
#[derive(Debug, Default, Clone)]
pub struct FileSource;

impl FileSource {
    pub fn new() -> Self {
        Self
    }
}

impl Fetcher for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch(&self, locator: &Locator, _policy: NetworkPolicy) -> Result<Fetched, FetchError> {
        let path = locator
            .file_path()
            .ok_or_else(|| FetchError::not_found(locator.as_str()))?;

        let not_found = |e: std::io::Error| match e.kind() {
            IoErrorKind::NotFound => FetchError::not_found(locator.as_str()),
            _ => FetchError::Io(e),
        };

        let expected = std::fs::metadata(&path).map_err(not_found)?.len();
        let bytes = std::fs::read(&path).map_err(not_found)?;
        let actual = bytes.len() as u64;
        if actual != expected {
            return Err(FetchError::ContentLengthMismatch { expected, actual });
        }

        trace!(path = %path.display(), bytes = actual, "File fetched");
        let mut fetched = Fetched::new(bytes, LoadedFrom::Disk);
        fetched.content_length = Some(expected);
        Ok(fetched)
    }
}
