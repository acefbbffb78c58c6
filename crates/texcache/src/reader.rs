//! Reader capability and the format plugin boundary.
//!
//! The cache does not decode files itself. It consumes [`ImageReader`], an
//! abstract random-access reader over one open image file, and obtains
//! readers from the process-wide [`ReaderRegistry`], which dispatches by
//! file extension.
//!
//! This crate registers no formats of its own; codec crates (or test
//! harnesses) call [`ReaderRegistry::register`] at startup.
//!
//! # Example
//!
//! ```ignore
//! use texcache::reader::ReaderRegistry;
//!
//! ReaderRegistry::global().register("exr", |path| {
//!     Ok(Box::new(ExrReader::open_at(path)?))
//! });
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};

use texcache_core::{ImageSpec, PixelType};

use crate::error::{CacheError, CacheResult};

/// Random-access reader over one open image file.
///
/// All methods are called with the per-file reader mutex held, so
/// implementations need no internal locking. A reader is closed by
/// dropping it.
pub trait ImageReader: Send {
    /// Name of the format this reader decodes, e.g. `"openexr"`.
    fn format_name(&self) -> &'static str;

    /// Opens the file and returns the spec of subimage 0.
    fn open(&mut self, path: &Path) -> CacheResult<ImageSpec>;

    /// Seeks to the given subimage, returning its spec, or `Ok(None)` if
    /// no such subimage exists.
    fn seek_subimage(&mut self, index: usize) -> CacheResult<Option<ImageSpec>>;

    /// Index of the subimage the reader is currently positioned at.
    fn current_subimage(&self) -> usize;

    /// Reads the native tile with lower-left-front corner `(x, y, z)` into
    /// `data`, converting to `format`. `data` must hold one tile's bytes.
    fn read_tile(&mut self, x: i32, y: i32, z: i32, format: PixelType, data: &mut [u8])
        -> CacheResult<()>;

    /// Reads scanline `y` of depth-slice `z` into `data`, converting to
    /// `format`. `data` must hold one scanline's bytes.
    fn read_scanline(&mut self, y: i32, z: i32, format: PixelType, data: &mut [u8])
        -> CacheResult<()>;

    /// Reads the entire current subimage into `data`, converting to
    /// `format`, placing consecutive rows `row_pitch` bytes apart.
    fn read_image(&mut self, format: PixelType, data: &mut [u8], row_pitch: usize)
        -> CacheResult<()>;
}

/// Factory that opens a reader for a path.
pub type ReaderFactory =
    Arc<dyn Fn(&Path) -> CacheResult<Box<dyn ImageReader>> + Send + Sync>;

/// Process-wide, extension-keyed registry of reader factories.
pub struct ReaderRegistry {
    factories: RwLock<HashMap<String, ReaderFactory>>,
}

impl ReaderRegistry {
    /// Returns the global registry, creating it on first use.
    pub fn global() -> &'static ReaderRegistry {
        static REGISTRY: OnceLock<ReaderRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| ReaderRegistry {
            factories: RwLock::new(HashMap::new()),
        })
    }

    /// Registers a factory for a file extension (without the dot,
    /// case-insensitive). Replaces any prior factory for that extension.
    pub fn register<F>(&self, extension: &str, factory: F)
    where
        F: Fn(&Path) -> CacheResult<Box<dyn ImageReader>> + Send + Sync + 'static,
    {
        let mut map = self.factories.write().unwrap();
        map.insert(extension.to_ascii_lowercase(), Arc::new(factory));
    }

    /// Whether a factory is registered for the extension.
    pub fn supports_extension(&self, extension: &str) -> bool {
        let map = self.factories.read().unwrap();
        map.contains_key(&extension.to_ascii_lowercase())
    }

    /// Creates a reader for `path`, dispatching on its extension. The
    /// returned reader is not yet open.
    pub fn create(&self, path: &Path) -> CacheResult<Box<dyn ImageReader>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let factory = {
            let map = self.factories.read().unwrap();
            map.get(&ext).cloned()
        };
        match factory {
            Some(f) => f(path),
            None => Err(CacheError::OpenFailure {
                filename: path.display().to_string(),
                reason: format!("no reader registered for extension \"{ext}\""),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullReader;

    impl ImageReader for NullReader {
        fn format_name(&self) -> &'static str {
            "null"
        }
        fn open(&mut self, _path: &Path) -> CacheResult<ImageSpec> {
            Ok(ImageSpec::new(1, 1, 1, PixelType::UInt8))
        }
        fn seek_subimage(&mut self, index: usize) -> CacheResult<Option<ImageSpec>> {
            Ok((index == 0).then(|| ImageSpec::new(1, 1, 1, PixelType::UInt8)))
        }
        fn current_subimage(&self) -> usize {
            0
        }
        fn read_tile(
            &mut self,
            _x: i32,
            _y: i32,
            _z: i32,
            _format: PixelType,
            _data: &mut [u8],
        ) -> CacheResult<()> {
            Ok(())
        }
        fn read_scanline(
            &mut self,
            _y: i32,
            _z: i32,
            _format: PixelType,
            _data: &mut [u8],
        ) -> CacheResult<()> {
            Ok(())
        }
        fn read_image(
            &mut self,
            _format: PixelType,
            _data: &mut [u8],
            _row_pitch: usize,
        ) -> CacheResult<()> {
            Ok(())
        }
    }

    #[test]
    fn register_and_dispatch() {
        let reg = ReaderRegistry {
            factories: RwLock::new(HashMap::new()),
        };
        assert!(!reg.supports_extension("nul"));
        reg.register("nul", |_path| Ok(Box::new(NullReader) as Box<dyn ImageReader>));
        assert!(reg.supports_extension("NUL"));

        let r = reg.create(Path::new("image.nul"));
        assert!(r.is_ok());
        assert_eq!(r.unwrap().format_name(), "null");
    }

    #[test]
    fn unknown_extension_fails() {
        let reg = ReaderRegistry {
            factories: RwLock::new(HashMap::new()),
        };
        let err = match reg.create(Path::new("image.xyz")) {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(err.to_string().contains("xyz"));
    }
}
