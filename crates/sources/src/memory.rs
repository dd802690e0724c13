//! In-memory fetcher with scripted failures
//!
//! Serves preloaded bytes keyed by the raw locator string. Failures can be
//! queued per locator and fetches can be held open, which makes it possible
//! to drive the dispatcher through dedup, retry and cancellation paths
//! deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use contracts::{FetchError, Fetched, Fetcher, LoadedFrom, Locator, NetworkPolicy};
use parking_lot::{Condvar, Mutex};
use tracing::trace;

/// Failure to inject on a future fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    NotFound,
    Timeout,
    ContentLengthMismatch,
    ConnectionReset,
}

impl ScriptedFailure {
    fn into_error(self, locator: &str) -> FetchError {
        match self {
            Self::NotFound => FetchError::not_found(locator),
            Self::Timeout => FetchError::timeout(locator),
            Self::ContentLengthMismatch => FetchError::ContentLengthMismatch {
                expected: 1024,
                actual: 512,
            },
            Self::ConnectionReset => FetchError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    bytes: Option<Bytes>,
    failures: VecDeque<ScriptedFailure>,
    policies: Vec<NetworkPolicy>,
}

/// Preloaded in-memory source
pub struct MemorySource {
    name: String,
    source: LoadedFrom,
    delay: Duration,
    entries: Mutex<HashMap<String, Entry>>,
    held: Mutex<bool>,
    released: Condvar,
    shut_down: AtomicBool,
}

impl MemorySource {
    /// Source that reports results as loaded from `source`
    pub fn new(source: LoadedFrom) -> Self {
        Self {
            name: "memory".to_string(),
            source,
            delay: Duration::ZERO,
            entries: Mutex::new(HashMap::new()),
            held: Mutex::new(false),
            released: Condvar::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sleep this long inside every fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn insert(&self, locator: &str, bytes: impl Into<Bytes>) {
        self.entries.lock().entry(locator.to_string()).or_default().bytes = Some(bytes.into());
    }

    /// Fail the next `times` fetches of `locator`
    pub fn fail_next(&self, locator: &str, failure: ScriptedFailure, times: usize) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(locator.to_string()).or_default();
        entry.failures.extend(std::iter::repeat(failure).take(times));
    }

    /// Block every fetch until [`release`](Self::release) is called
    pub fn hold(&self) {
        *self.held.lock() = true;
    }

    pub fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_all();
    }

    /// Number of fetches started for `locator`
    pub fn fetch_count(&self, locator: &str) -> usize {
        self.entries
            .lock()
            .get(locator)
            .map_or(0, |entry| entry.policies.len())
    }

    /// Network policies seen by each fetch of `locator`, in order
    pub fn policies(&self, locator: &str) -> Vec<NetworkPolicy> {
        self.entries
            .lock()
            .get(locator)
            .map(|entry| entry.policies.clone())
            .unwrap_or_default()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn wait_while_held(&self) {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
    }
}

impl Fetcher for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, locator: &Locator, policy: NetworkPolicy) -> Result<Fetched, FetchError> {
        let key = locator.as_str();
        self.entries
            .lock()
            .entry(key.to_string())
            .or_default()
            .policies
            .push(policy);

        self.wait_while_held();
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_default();
        if let Some(failure) = entry.failures.pop_front() {
            trace!(locator = key, ?failure, "Scripted fetch failure");
            return Err(failure.into_error(key));
        }
        match &entry.bytes {
            Some(bytes) => Ok(Fetched::new(bytes.clone(), self.source)),
            None => Err(FetchError::not_found(key)),
        }
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        // Never leave a worker parked on a dead source
        self.release();
    }
}
