//! Fingerprint - deduplication key of a request

use std::fmt;
use std::sync::Arc;

/// Key built once per request from its locator and transform parameters.
///
/// Segments are newline separated. The key is cloned into the hunter map,
/// the memory cache and every action reference, so it shares one `Arc<str>`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Arc<str>);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // One log line per key
        f.write_str(&self.0.trim_end().replace('\n', "|"))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_storage() {
        let a = Fingerprint::from("https://x.io/a.png\n");
        let b = a.clone();
        assert_eq!(a.as_str().as_ptr(), b.as_str().as_ptr());
        assert_eq!(a, b);
    }

    #[test]
    fn test_display_flattens_newlines() {
        let key = Fingerprint::from("file:///a.png\nresize:10x10\n".to_string());
        assert_eq!(key.to_string(), "file:///a.png|resize:10x10");
        assert_eq!(format!("{key:?}"), "Fingerprint(file:///a.png|resize:10x10)");
    }
}
