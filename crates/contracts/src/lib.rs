//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace: the
//! request data model, the error taxonomy and the capability traits the
//! coordinator consumes (fetch, decode, memory cache).
//! Business crates depend on this crate only, reverse dependencies are prohibited.
//!
//! ## Identity Model
//! - A `Fingerprint` is derived from the locator plus transform parameters
//! - Two logically identical requests always produce equal fingerprints

mod capability;
mod config;
mod error;
mod fingerprint;
mod image;
mod locator;
mod network;
mod request;

pub use capability::*;
pub use config::*;
pub use error::*;
pub use fingerprint::Fingerprint;
pub use image::*;
pub use locator::{Locator, LocatorKind};
pub use network::*;
pub use request::*;
