//! # texcache
//!
//! A process-wide tiled image cache. Rendering and texturing workloads
//! randomly access pixel data from many large multi-resolution files;
//! the cache opens files on demand, reads tiles on demand, keeps them
//! resident subject to a byte budget, bounds the number of concurrently
//! open readers, and serves queries from many threads with minimal
//! contention.
//!
//! # Quick start
//!
//! ```ignore
//! use texcache::{ImageCache, PixelType};
//!
//! let cache = ImageCache::create(true); // process-wide shared cache
//! cache.attribute("max_memory_MB", 512);
//! cache.attribute("autotile", 64);
//!
//! let spec = cache.get_imagespec("color.tx", 0)?;
//! let mut pixels = vec![0u8; 64 * 64 * spec.nchannels as usize * 4];
//! cache.get_pixels("color.tx", 0, 0, 64, 0, 64, 0, 1, PixelType::Float, &mut pixels)?;
//! ```
//!
//! # Architecture
//!
//! - Two tables behind independent reader-writer locks: filenames to
//!   cached files, tile ids to resident tiles. Expensive I/O always
//!   happens outside them.
//! - A thread-local two-entry micro-cache short-circuits the common case
//!   of adjacent lookups hitting the same tile, touching no lock at all.
//! - Clock-style second-chance eviction bounds both open readers
//!   (`max_open_files`) and resident pixel bytes (`max_memory_MB`).
//! - Scanline files get tiles synthesized from strips (`autotile`), and
//!   single-level files can have a MIP pyramid synthesized on the fly
//!   (`automip`).
//! - Files with identical content fingerprints and sampling metadata are
//!   deduplicated against one canonical entry.
//!
//! The codec layer is not part of this crate: register an
//! [`ImageReader`] factory per file extension with
//! [`ReaderRegistry::global()`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod cache;
mod error;
mod file;
mod perthread;
mod stats;
mod tile;

pub mod reader;
pub mod texture;

pub use cache::ImageCache;
pub use error::{CacheError, CacheResult};
pub use reader::{ImageReader, ReaderRegistry};
pub use stats::CacheStats;
pub use tile::TileHandle;

// The shared vocabulary types, re-exported for convenience.
pub use texcache_core::{AttrValue, Attrs, ImageSpec, PixelType};
