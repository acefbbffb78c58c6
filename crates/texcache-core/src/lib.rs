//! # texcache-core
//!
//! Core value types for the texcache tiled image cache:
//!
//! - [`PixelType`] - scalar channel data types
//! - [`ImageSpec`] - per-subimage geometry, tiling, and metadata
//! - [`Attrs`] / [`AttrValue`] - typed attribute storage
//! - [`convert`] - normalized pixel value conversion between types
//!
//! This crate holds no I/O and no locking; it is the shared vocabulary
//! between the cache, codec readers, and consumers.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod attrs;
pub mod convert;
pub mod format;
pub mod spec;

pub use attrs::{AttrValue, Attrs};
pub use format::PixelType;
pub use spec::ImageSpec;
