//! Request - what a caller asks for
//!
//! A request is a locator plus transform parameters and caching policy.
//! Its [`Fingerprint`] is the deduplication key used by the dispatcher.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{Fingerprint, Locator};

/// Scheduling priority; higher runs first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

bitflags! {
    /// Memory cache policy of a request
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemoryPolicy: u8 {
        /// Skip the memory cache lookup
        const NO_CACHE = 1 << 0;
        /// Do not store the result in the memory cache
        const NO_STORE = 1 << 1;
    }
}

impl MemoryPolicy {
    pub fn should_read_from_memory_cache(self) -> bool {
        !self.contains(Self::NO_CACHE)
    }

    pub fn should_write_to_memory_cache(self) -> bool {
        !self.contains(Self::NO_STORE)
    }
}

bitflags! {
    /// Network/disk cache policy handed to the fetch capability
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NetworkPolicy: u8 {
        /// Skip the fetcher's disk cache and go to the network
        const NO_CACHE = 1 << 0;
        /// Do not store the response in the fetcher's disk cache
        const NO_STORE = 1 << 1;
        /// Only answer from the fetcher's disk cache
        const OFFLINE = 1 << 2;
    }
}

impl NetworkPolicy {
    pub fn should_read_from_disk_cache(self) -> bool {
        !self.contains(Self::NO_CACHE)
    }

    pub fn should_write_to_disk_cache(self) -> bool {
        !self.contains(Self::NO_STORE)
    }

    pub fn is_offline_only(self) -> bool {
        self.contains(Self::OFFLINE)
    }
}

/// Caller-assigned grouping label used for pause/resume
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(Arc<str>);

impl Tag {
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:?})", self.0)
    }
}

/// Identity of a display target (a view, a slot in a list...)
///
/// At most one request is live per target; a new request for the same target
/// replaces the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// How a resized image fills its bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// Stretch to the exact size
    #[default]
    Fit,
    /// Scale to cover, then crop the overflow
    CenterCrop,
    /// Scale to fit inside, preserving aspect ratio
    CenterInside,
}

/// An image request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub locator: Locator,
    /// Replaces the locator in the fingerprint when set
    pub stable_key: Option<String>,
    /// Target size in pixels
    pub resize: Option<(u32, u32)>,
    pub scale: ScaleMode,
    /// Clockwise rotation in degrees
    pub rotation_degrees: Option<f32>,
    pub priority: Priority,
    pub memory_policy: MemoryPolicy,
    pub network_policy: NetworkPolicy,
}

impl Request {
    pub fn new(locator: impl Into<Locator>) -> Self {
        Self {
            locator: locator.into(),
            stable_key: None,
            resize: None,
            scale: ScaleMode::Fit,
            rotation_degrees: None,
            priority: Priority::Normal,
            memory_policy: MemoryPolicy::empty(),
            network_policy: NetworkPolicy::empty(),
        }
    }

    pub fn stable_key(mut self, key: impl Into<String>) -> Self {
        self.stable_key = Some(key.into());
        self
    }

    pub fn resize(mut self, width: u32, height: u32) -> Self {
        self.resize = Some((width, height));
        self
    }

    pub fn center_crop(mut self) -> Self {
        self.scale = ScaleMode::CenterCrop;
        self
    }

    pub fn center_inside(mut self) -> Self {
        self.scale = ScaleMode::CenterInside;
        self
    }

    pub fn rotate(mut self, degrees: f32) -> Self {
        self.rotation_degrees = Some(degrees);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn memory_policy(mut self, policy: MemoryPolicy) -> Self {
        self.memory_policy = policy;
        self
    }

    pub fn network_policy(mut self, policy: NetworkPolicy) -> Self {
        self.network_policy = policy;
        self
    }

    /// Whether any transform has to be applied after decoding
    pub fn needs_transformation(&self) -> bool {
        self.resize.is_some() || self.rotation_degrees.is_some_and(|d| d != 0.0)
    }

    /// Deterministic deduplication key.
    ///
    /// Layout: `<stable key or locator>\n[rotation:<deg>\n][resize:<w>x<h>\n][centerCrop\n|centerInside\n]`.
    /// Priority and caching policies are deliberately excluded.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut key = String::with_capacity(self.locator.as_str().len() + 32);
        key.push_str(self.stable_key.as_deref().unwrap_or(self.locator.as_str()));
        key.push('\n');

        if let Some(degrees) = self.rotation_degrees.filter(|d| *d != 0.0) {
            let _ = writeln!(key, "rotation:{degrees}");
        }
        if let Some((w, h)) = self.resize {
            let _ = writeln!(key, "resize:{w}x{h}");
        }
        match self.scale {
            ScaleMode::CenterCrop => key.push_str("centerCrop\n"),
            ScaleMode::CenterInside => key.push_str("centerInside\n"),
            ScaleMode::Fit => {}
        }

        Fingerprint::from(key)
    }
}
