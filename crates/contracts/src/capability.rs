//! Capability traits consumed by the dispatcher
//!
//! Fetching and decoding run on blocking worker threads, so the traits are
//! synchronous and object safe. Implementations must be `Send + Sync`; the
//! same instance is shared by every worker.

use std::sync::Arc;

use crate::{DecodeError, DecodeHints, FetchError, Fetched, Fingerprint, Image, Locator, NetworkPolicy};

/// Source of raw image bytes for one or more [`LocatorKind`](crate::LocatorKind)s
pub trait Fetcher: Send + Sync {
    /// Name used in logs and metrics
    fn name(&self) -> &str;

    /// Load the bytes behind `locator`.
    ///
    /// # Errors
    /// `NotFound` for missing resources, `Timeout`/`ContentLengthMismatch`/`Io`
    /// for transient failures.
    fn fetch(&self, locator: &Locator, policy: NetworkPolicy) -> Result<Fetched, FetchError>;

    /// Release held resources (connections, disk cache handles)
    fn shutdown(&self) {}
}

/// Turns fetched bytes into an [`Image`], applying the transform hints
pub trait Decoder: Send + Sync {
    fn decode(&self, fetched: Fetched, hints: &DecodeHints) -> Result<Image, DecodeError>;
}

/// Shared in-memory image cache
///
/// Implementations synchronise internally; workers read it concurrently with
/// the caller side while the dispatcher writes completed results.
pub trait MemoryCache: Send + Sync {
    fn get(&self, key: &Fingerprint) -> Option<Arc<Image>>;

    fn set(&self, key: Fingerprint, image: Arc<Image>);

    fn clear(&self);

    /// Number of cached entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently held
    fn size_bytes(&self) -> usize;
}
