//! Synthetic image format for exercising the cache without real codecs.
//!
//! Tests describe files with [`SynthFileDef`] and register them under a
//! real path on disk (so search-path resolution and mtime comparison see
//! a real file); the registered reader serves deterministic procedural
//! pixels and counts every codec-level call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use texcache::reader::{ImageReader, ReaderRegistry};
use texcache::{CacheError, CacheResult, ImageSpec, PixelType};
use texcache_core::convert::f32_to_value;

/// Extension the synthetic format registers itself under.
pub const EXT: &str = "synth";

/// Description of one synthetic file.
#[derive(Clone)]
pub struct SynthFileDef {
    pub width: u32,
    pub height: u32,
    pub nchannels: u32,
    pub format: PixelType,
    /// 0 means scanline-oriented (no native tiles).
    pub tile_width: u32,
    pub tile_height: u32,
    /// Number of natural subimages; dimensions halve per level.
    pub levels: usize,
    /// Becomes the `ImageDescription` attribute.
    pub description: Option<String>,
    /// Becomes the `wrapmodes` attribute.
    pub wrapmodes: Option<String>,
    /// Every pixel read fails (opens still succeed).
    pub fail_reads: bool,
}

impl Default for SynthFileDef {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            nchannels: 4,
            format: PixelType::UInt8,
            tile_width: 0,
            tile_height: 0,
            levels: 1,
            description: None,
            wrapmodes: None,
            fail_reads: false,
        }
    }
}

/// Codec-level call counters for one synthetic file.
#[derive(Default)]
pub struct Counters {
    pub opens: AtomicU64,
    pub tile_reads: AtomicU64,
    pub scanline_reads: AtomicU64,
    pub image_reads: AtomicU64,
}

impl Counters {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }
    pub fn tile_reads(&self) -> u64 {
        self.tile_reads.load(Ordering::SeqCst)
    }
    pub fn scanline_reads(&self) -> u64 {
        self.scanline_reads.load(Ordering::SeqCst)
    }
    pub fn image_reads(&self) -> u64 {
        self.image_reads.load(Ordering::SeqCst)
    }
}

struct SynthWorld {
    defs: Mutex<HashMap<PathBuf, (SynthFileDef, Arc<Counters>)>>,
}

fn world() -> &'static SynthWorld {
    static WORLD: OnceLock<SynthWorld> = OnceLock::new();
    WORLD.get_or_init(|| {
        ReaderRegistry::global().register(EXT, |path| {
            let defs = world().defs.lock().unwrap();
            match defs.get(path) {
                Some((def, counters)) => Ok(Box::new(SynthReader {
                    def: def.clone(),
                    counters: counters.clone(),
                    current: 0,
                }) as Box<dyn ImageReader>),
                None => Err(CacheError::OpenFailure {
                    filename: path.display().to_string(),
                    reason: "no synthetic definition for this path".into(),
                }),
            }
        });
        SynthWorld {
            defs: Mutex::new(HashMap::new()),
        }
    })
}

/// Registers a synthetic file, creating a real file at `path` so that
/// filename resolution and mtime checks behave normally. Returns the
/// counters the reader will update.
pub fn define_file(path: &Path, def: SynthFileDef) -> Arc<Counters> {
    std::fs::write(path, b"synthetic image stand-in").unwrap();
    let counters = Arc::new(Counters::default());
    world()
        .defs
        .lock()
        .unwrap()
        .insert(path.to_path_buf(), (def, counters.clone()));
    counters
}

/// A unique path in the temp directory for this test process.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "texcache_test_{}_{}.{}",
        std::process::id(),
        name,
        EXT
    ))
}

/// The procedural pixel value at `(x, y, channel)` of `level`,
/// normalized to [0, 1]. Out-of-range coordinates read as 0.
pub fn expected_value(def: &SynthFileDef, level: usize, x: i32, y: i32, c: u32) -> f32 {
    let w = (def.width >> level).max(1) as i32;
    let h = (def.height >> level).max(1) as i32;
    if x < 0 || x >= w || y < 0 || y >= h {
        return 0.0;
    }
    let v = (x * 7 + y * 13 + c as i32 * 29 + level as i32 * 3) & 0xff;
    v as f32 / 255.0
}

/// The same value quantized the way the u8 cache path stores it.
pub fn expected_u8(def: &SynthFileDef, level: usize, x: i32, y: i32, c: u32) -> u8 {
    (expected_value(def, level, x, y, c) * 255.0).round() as u8
}

struct SynthReader {
    def: SynthFileDef,
    counters: Arc<Counters>,
    current: usize,
}

impl SynthReader {
    fn level_spec(&self, level: usize) -> Option<ImageSpec> {
        if level >= self.def.levels {
            return None;
        }
        let w = (self.def.width >> level).max(1);
        let h = (self.def.height >> level).max(1);
        let mut spec = ImageSpec::new(w, h, self.def.nchannels, self.def.format);
        spec.tile_width = self.def.tile_width;
        spec.tile_height = self.def.tile_height;
        spec.tile_depth = if self.def.tile_width > 0 { 1 } else { 0 };
        if let Some(desc) = &self.def.description {
            spec.attrs.set("ImageDescription", desc.as_str());
        }
        if let Some(wrap) = &self.def.wrapmodes {
            spec.attrs.set("wrapmodes", wrap.as_str());
        }
        Some(spec)
    }

    fn fail(&self, what: &str) -> CacheError {
        CacheError::ReadFailure {
            filename: "synthetic".into(),
            reason: format!("simulated {what} failure"),
        }
    }
}

impl ImageReader for SynthReader {
    fn format_name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&mut self, path: &Path) -> CacheResult<ImageSpec> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.current = 0;
        self.level_spec(0).ok_or_else(|| CacheError::OpenFailure {
            filename: path.display().to_string(),
            reason: "no subimages".into(),
        })
    }

    fn seek_subimage(&mut self, index: usize) -> CacheResult<Option<ImageSpec>> {
        match self.level_spec(index) {
            Some(spec) => {
                self.current = index;
                Ok(Some(spec))
            }
            None => Ok(None),
        }
    }

    fn current_subimage(&self) -> usize {
        self.current
    }

    fn read_tile(
        &mut self,
        x: i32,
        y: i32,
        _z: i32,
        format: PixelType,
        data: &mut [u8],
    ) -> CacheResult<()> {
        if self.def.fail_reads {
            return Err(self.fail("tile read"));
        }
        if self.def.tile_width == 0 {
            return Err(self.fail("tile read on scanline file"));
        }
        self.counters.tile_reads.fetch_add(1, Ordering::SeqCst);
        let tw = self.def.tile_width as i32;
        let th = self.def.tile_height as i32;
        let nch = self.def.nchannels;
        for row in 0..th {
            for col in 0..tw {
                for c in 0..nch {
                    let v = expected_value(&self.def, self.current, x + col, y + row, c);
                    let idx = ((row * tw + col) as usize) * nch as usize + c as usize;
                    f32_to_value(format, v, data, idx);
                }
            }
        }
        Ok(())
    }

    fn read_scanline(
        &mut self,
        y: i32,
        _z: i32,
        format: PixelType,
        data: &mut [u8],
    ) -> CacheResult<()> {
        if self.def.fail_reads {
            return Err(self.fail("scanline read"));
        }
        self.counters.scanline_reads.fetch_add(1, Ordering::SeqCst);
        let w = (self.def.width >> self.current).max(1) as i32;
        let nch = self.def.nchannels;
        for col in 0..w {
            for c in 0..nch {
                let v = expected_value(&self.def, self.current, col, y, c);
                f32_to_value(format, v, data, col as usize * nch as usize + c as usize);
            }
        }
        Ok(())
    }

    fn read_image(
        &mut self,
        format: PixelType,
        data: &mut [u8],
        row_pitch: usize,
    ) -> CacheResult<()> {
        if self.def.fail_reads {
            return Err(self.fail("image read"));
        }
        self.counters.image_reads.fetch_add(1, Ordering::SeqCst);
        let w = (self.def.width >> self.current).max(1) as i32;
        let h = (self.def.height >> self.current).max(1) as i32;
        let nch = self.def.nchannels;
        for row in 0..h {
            let row_buf = &mut data[row as usize * row_pitch..];
            for col in 0..w {
                for c in 0..nch {
                    let v = expected_value(&self.def, self.current, col, row, c);
                    f32_to_value(format, v, row_buf, col as usize * nch as usize + c as usize);
                }
            }
        }
        Ok(())
    }
}
