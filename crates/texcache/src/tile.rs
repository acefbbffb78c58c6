//! Cached tiles and their identifiers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use texcache_core::PixelType;

use crate::cache::CacheInner;
use crate::file::CachedFile;
use crate::perthread::PerThreadInfo;
use crate::stats::ThreadStats;

/// Identifies one tile: which file, which subimage, and the tile's
/// lower-left-front pixel coordinate on the tile lattice.
///
/// Equality and hashing are structural over all five fields, with file
/// identity meaning "the same `CachedFile` object".
#[derive(Clone)]
pub(crate) struct TileId {
    file: Arc<CachedFile>,
    subimage: usize,
    x: i32,
    y: i32,
    z: i32,
}

impl TileId {
    pub fn new(file: Arc<CachedFile>, subimage: usize, x: i32, y: i32, z: i32) -> Self {
        Self {
            file,
            subimage,
            x,
            y,
            z,
        }
    }

    #[inline]
    pub fn file(&self) -> &Arc<CachedFile> {
        &self.file
    }

    #[inline]
    pub fn subimage(&self) -> usize {
        self.subimage
    }

    #[inline]
    pub fn x(&self) -> i32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> i32 {
        self.y
    }

    #[inline]
    pub fn z(&self) -> i32 {
        self.z
    }
}

impl PartialEq for TileId {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.file, &other.file)
            && self.subimage == other.subimage
            && self.x == other.x
            && self.y == other.y
            && self.z == other.z
    }
}

impl Eq for TileId {}

impl std::hash::Hash for TileId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.file) as usize).hash(state);
        self.subimage.hash(state);
        self.x.hash(state);
        self.y.hash(state);
        self.z.hash(state);
    }
}

impl std::fmt::Debug for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TileId({} si={} {},{},{})",
            self.file.filename(),
            self.subimage,
            self.x,
            self.y,
            self.z
        )
    }
}

/// One resident tile: a pixel buffer at the owning file's cached data
/// type, in channel-interleaved row-major order.
///
/// The pin count of a tile is its `Arc` strong count: the tile table
/// holds one reference, so any additional reference (a micro-cache slot,
/// a client handle) pins the tile against eviction. The cache's memory
/// counter is charged at construction and credited back when the last
/// reference drops.
pub(crate) struct CachedTile {
    id: TileId,
    pixels: Box<[u8]>,
    channel_format: PixelType,
    tile_width: u32,
    tile_height: u32,
    tile_depth: u32,
    pixel_bytes: usize,
    valid: bool,
    used: AtomicBool,
    mem_used: Arc<AtomicUsize>,
}

impl CachedTile {
    /// Reads the identified tile from its file. Never fails: a failed
    /// read produces a zero-filled tile marked invalid (and not `used`,
    /// so it will not survive an eviction sweep).
    pub fn read(cache: &CacheInner, info: &mut PerThreadInfo, id: TileId) -> Arc<CachedTile> {
        let file = id.file().clone();
        let (meta, spec) = match file.meta().and_then(|m| {
            m.subimages
                .get(id.subimage())
                .cloned()
                .ok_or_else(|| {
                    crate::error::CacheError::BadArg(format!(
                        "no subimage {} in \"{}\"",
                        id.subimage(),
                        file.filename()
                    ))
                })
                .map(|s| (m, s))
        }) {
            Ok(pair) => pair,
            Err(err) => {
                cache.record_error(&err);
                return Self::invalid(cache, id);
            }
        };

        let size = spec.tile_bytes(meta.datatype);
        let mut pixels = vec![0u8; size].into_boxed_slice();
        let t0 = Instant::now();
        let result = CachedFile::read_tile(
            &file,
            cache,
            info,
            id.subimage(),
            id.x(),
            id.y(),
            id.z(),
            meta.datatype,
            &mut pixels,
        );
        let dt = t0.elapsed();
        file.add_io_time(dt);
        ThreadStats::add_time(&info.stats().file_io_time_ns, dt);

        let valid = match result {
            Ok(()) => true,
            Err(err) => {
                cache.record_error(&err);
                false
            }
        };
        cache.charge_tile_memory(size);
        Arc::new(CachedTile {
            id,
            pixels,
            channel_format: meta.datatype,
            tile_width: spec.tile_width,
            tile_height: spec.tile_height,
            tile_depth: spec.tile_depth.max(1),
            pixel_bytes: spec.pixel_bytes(meta.datatype),
            valid,
            used: AtomicBool::new(valid),
            mem_used: cache.mem_counter(),
        })
    }

    /// Builds a tile by copying rows out of a scanline strip that was
    /// just read for a sibling tile. `x_byte_offset` is the byte offset
    /// of this tile's first column within each strip row of `row_pitch`
    /// bytes.
    pub fn from_strip(
        cache: &CacheInner,
        id: TileId,
        format: PixelType,
        tile_width: u32,
        tile_height: u32,
        pixel_bytes: usize,
        strip: &[u8],
        row_pitch: usize,
        x_byte_offset: usize,
    ) -> Arc<CachedTile> {
        let row_bytes = tile_width as usize * pixel_bytes;
        let size = row_bytes * tile_height as usize;
        let mut pixels = vec![0u8; size].into_boxed_slice();
        for row in 0..tile_height as usize {
            let src = &strip[row * row_pitch + x_byte_offset..][..row_bytes];
            pixels[row * row_bytes..][..row_bytes].copy_from_slice(src);
        }
        cache.charge_tile_memory(size);
        Arc::new(CachedTile {
            id,
            pixels,
            channel_format: format,
            tile_width,
            tile_height,
            tile_depth: 1,
            pixel_bytes,
            valid: true,
            used: AtomicBool::new(true),
            mem_used: cache.mem_counter(),
        })
    }

    fn invalid(cache: &CacheInner, id: TileId) -> Arc<CachedTile> {
        Arc::new(CachedTile {
            id,
            pixels: Box::new([]),
            channel_format: PixelType::Float,
            tile_width: 0,
            tile_height: 0,
            tile_depth: 1,
            pixel_bytes: 0,
            valid: false,
            used: AtomicBool::new(false),
            mem_used: cache.mem_counter(),
        })
    }

    #[inline]
    pub fn id(&self) -> &TileId {
        &self.id
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn channel_format(&self) -> PixelType {
        self.channel_format
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Marks the tile recently used for the eviction clock.
    #[inline]
    pub fn mark_used(&self) {
        self.used.store(true, Ordering::Relaxed);
    }

    /// Clears the used bit, returning whether it was set (the tile gets a
    /// second chance if so).
    #[inline]
    pub fn clear_used(&self) -> bool {
        self.used.swap(false, Ordering::Relaxed)
    }

    /// The bytes of the pixel at absolute coordinates `(x, y, z)`, or
    /// `None` if the coordinates fall outside this tile.
    pub fn data(&self, x: i32, y: i32, z: i32) -> Option<&[u8]> {
        let lx = x - self.id.x();
        let ly = y - self.id.y();
        let lz = z - self.id.z();
        let (w, h, d) = (
            self.tile_width as i32,
            self.tile_height as i32,
            self.tile_depth as i32,
        );
        if lx < 0 || lx >= w || ly < 0 || ly >= h || lz < 0 || lz >= d {
            return None;
        }
        let offset = ((lz as usize * h as usize + ly as usize) * w as usize + lx as usize)
            * self.pixel_bytes;
        Some(&self.pixels[offset..])
    }
}

impl Drop for CachedTile {
    fn drop(&mut self) {
        self.mem_used.fetch_sub(self.pixels.len(), Ordering::Relaxed);
    }
}

/// An opaque, pinned reference to a cached tile, returned by
/// [`ImageCache::get_tile`](crate::ImageCache::get_tile). While a handle
/// is alive the tile cannot be evicted; drop it (or pass it to
/// [`ImageCache::release_tile`](crate::ImageCache::release_tile)) to
/// unpin.
pub struct TileHandle {
    pub(crate) tile: Arc<CachedTile>,
}

impl TileHandle {
    /// The tile's raw pixel buffer, channel-interleaved row-major at
    /// [`pixel_type`](Self::pixel_type).
    pub fn pixels(&self) -> &[u8] {
        self.tile.pixels()
    }

    /// The element type of the pixel buffer.
    pub fn pixel_type(&self) -> PixelType {
        self.tile.channel_format()
    }
}
