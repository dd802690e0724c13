//! Image payloads passed between fetch, decode, cache and delivery

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Request, ScaleMode};

/// Where a delivered image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadedFrom {
    Memory,
    Disk,
    Network,
}

impl fmt::Display for LoadedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Network => "network",
        };
        f.write_str(name)
    }
}

/// Raw bytes returned by a [`Fetcher`](crate::Fetcher)
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Bytes,
    pub source: LoadedFrom,
    /// Advertised length, when the source reports one
    pub content_length: Option<u64>,
}

impl Fetched {
    pub fn new(bytes: impl Into<Bytes>, source: LoadedFrom) -> Self {
        Self {
            bytes: bytes.into(),
            source,
            content_length: None,
        }
    }
}

/// Decoded RGBA8 image
///
/// `pixels` is shared, so cloning an image into the cache and into every
/// delivery costs a reference count bump.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

impl Image {
    pub fn new(width: u32, height: u32, pixels: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// Bytes accounted against the memory cache budget
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Transform parameters handed to the decoder
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodeHints {
    pub resize: Option<(u32, u32)>,
    pub scale: ScaleMode,
    pub rotation_degrees: Option<f32>,
}

impl From<&Request> for DecodeHints {
    fn from(request: &Request) -> Self {
        Self {
            resize: request.resize,
            scale: request.scale,
            rotation_degrees: request.rotation_degrees,
        }
    }
}
