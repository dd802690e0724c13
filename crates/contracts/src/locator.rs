//! Locator - where a visual resource lives
//!
//! The scheme of a locator selects one of a closed set of [`LocatorKind`]s.
//! Fetch capabilities are registered per kind and selected by matching on
//! the tag, and the kind also carries the retry/replay policy of its source.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::NetworkInfo;

/// Source category of a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    /// `package:<name>` - an installed package's icon
    Package,
    /// `component:<package>/<class>` - an activity's icon
    Component,
    /// `apk:<path>` - icon embedded in an archive on disk
    ApkFile,
    /// `file://<path>` or an absolute path
    PlainFile,
    /// `http://` / `https://`
    Network,
    /// `content://<authority>/...`
    ContentUri,
    /// `android.resource://<package>/<id>`
    Resource,
    /// Anything else; no source can handle it
    Unrecognized,
}

impl LocatorKind {
    /// All kinds a source may be registered for
    pub const ALL: [LocatorKind; 7] = [
        Self::Package,
        Self::Component,
        Self::ApkFile,
        Self::PlainFile,
        Self::Network,
        Self::ContentUri,
        Self::Resource,
    ];

    fn from_scheme(scheme: &str) -> Self {
        match scheme {
            "package" => Self::Package,
            "component" => Self::Component,
            "apk" => Self::ApkFile,
            "file" => Self::PlainFile,
            "http" | "https" => Self::Network,
            "content" => Self::ContentUri,
            "android.resource" => Self::Resource,
            _ => Self::Unrecognized,
        }
    }

    /// Whether the source may be retried after a transient failure
    pub fn is_network(self) -> bool {
        matches!(self, Self::Network)
    }

    /// In-process retry budget; only network sources get one
    pub fn retry_count(self, network_retry_count: u32) -> u32 {
        if self.is_network() {
            network_retry_count
        } else {
            0
        }
    }

    /// Whether a failed fetch may be replayed once connectivity returns.
    ///
    /// Only network fetches are idempotent re-fetches; local sources either
    /// succeed or fail deterministically.
    pub fn supports_replay(self) -> bool {
        self.is_network()
    }

    /// Source-specific retry eligibility given the latest connectivity view.
    ///
    /// `network` is `None` when no snapshot is available (connectivity is not
    /// being scanned), in which case a network retry is allowed.
    pub fn should_retry(self, airplane_mode: bool, network: Option<&NetworkInfo>) -> bool {
        match self {
            Self::Network => !airplane_mode && network.map_or(true, NetworkInfo::is_connected),
            _ => false,
        }
    }
}

impl fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Package => "package",
            Self::Component => "component",
            Self::ApkFile => "apk",
            Self::PlainFile => "file",
            Self::Network => "network",
            Self::ContentUri => "content",
            Self::Resource => "resource",
            Self::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

/// A resource locator
///
/// Parsing never fails: strings that are not URIs (or use an unknown scheme)
/// become [`LocatorKind::Unrecognized`] and are rejected by the dispatcher.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    raw: Arc<str>,
    kind: LocatorKind,
}

impl Locator {
    /// Classify a raw locator string
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref().trim();
        let kind = if raw.starts_with('/') {
            LocatorKind::PlainFile
        } else {
            match Url::parse(raw) {
                Ok(url) => LocatorKind::from_scheme(url.scheme()),
                Err(_) => LocatorKind::Unrecognized,
            }
        };
        Self {
            raw: Arc::from(raw),
            kind,
        }
    }

    /// Locator for a file on disk
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Url::from_file_path(&path) {
            Ok(url) => Self::new(url.as_str()),
            Err(()) => Self::new(path.to_string_lossy()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> LocatorKind {
        self.kind
    }

    /// Everything after `<scheme>:`; the whole string for bare paths
    pub fn scheme_specific_part(&self) -> &str {
        if self.raw.starts_with('/') {
            return &self.raw;
        }
        match self.raw.split_once(':') {
            Some((_, rest)) => rest,
            None => &self.raw,
        }
    }

    /// Filesystem path for plain-file and archive locators
    pub fn file_path(&self) -> Option<PathBuf> {
        match self.kind {
            LocatorKind::PlainFile if self.raw.starts_with('/') => {
                Some(PathBuf::from(self.raw.as_ref()))
            }
            LocatorKind::PlainFile => Url::parse(&self.raw).ok()?.to_file_path().ok(),
            LocatorKind::ApkFile => Some(PathBuf::from(self.scheme_specific_part())),
            _ => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({:?}, {})", self.raw, self.kind)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Locator {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
