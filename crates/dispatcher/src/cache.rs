//! LruMemoryCache - byte-bounded in-memory image cache

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::{CacheConfig, Fingerprint, Image, MemoryCache};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

/// Least-recently-used cache bounded by decoded pixel bytes
///
/// The underlying `LruCache` is unbounded by count; eviction pops the least
/// recently used entry until the byte total fits again.
pub struct LruMemoryCache {
    max_bytes: usize,
    state: Mutex<LruState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct LruState {
    entries: LruCache<Fingerprint, Arc<Image>>,
    size_bytes: usize,
}

/// Snapshot of cache state (for reporting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub size_bytes: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

impl LruMemoryCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            state: Mutex::new(LruState {
                entries: LruCache::unbounded(),
                size_bytes: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_bytes)
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            size_bytes: state.size_bytes,
            max_bytes: self.max_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl LruState {
    fn remove(&mut self, key: &Fingerprint) {
        if let Some(old) = self.entries.pop(key) {
            self.size_bytes = self.size_bytes.saturating_sub(old.byte_size());
        }
    }

    fn evict_to(&mut self, max_bytes: usize) {
        while self.size_bytes > max_bytes {
            let Some((key, image)) = self.entries.pop_lru() else {
                break;
            };
            self.size_bytes = self.size_bytes.saturating_sub(image.byte_size());
            trace!(key = %key, bytes = image.byte_size(), "Evicted from memory cache");
        }
    }
}

impl MemoryCache for LruMemoryCache {
    fn get(&self, key: &Fingerprint) -> Option<Arc<Image>> {
        let found = self.state.lock().entries.get(key).map(Arc::clone);

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        observability::metrics::record_cache_lookup(found.is_some());
        found
    }

    fn set(&self, key: Fingerprint, image: Arc<Image>) {
        let bytes = image.byte_size();
        let mut state = self.state.lock();
        state.remove(&key);
        if bytes > self.max_bytes {
            trace!(key = %key, bytes, "Image larger than the whole cache, not stored");
            return;
        }
        state.entries.put(key, image);
        state.size_bytes += bytes;
        state.evict_to(self.max_bytes);
        observability::metrics::record_cache_size(state.entries.len(), state.size_bytes);
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.size_bytes = 0;
        observability::metrics::record_cache_size(0, 0);
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn size_bytes(&self) -> usize {
        self.state.lock().size_bytes
    }
}
