//! Cached files.
//!
//! A [`CachedFile`] exists for every filename the cache has ever been
//! asked about. It owns the (possibly closed) reader, the per-subimage
//! spec list and derived metadata, the clock bit for open-handle
//! eviction, and per-file statistics. Files that turn out to hold the
//! same pixels as an earlier file become lightweight duplicates pointing
//! at the canonical entry.
//!
//! Reads dispatch three ways: natively tiled files read tiles directly;
//! scanline files have tiles synthesized from scanline strips
//! (`read_untiled`); MIP levels that do not exist in the file are
//! synthesized by filtering the next finer level through the cache
//! itself (`read_unmipped`).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant, SystemTime};

use texcache_core::{convert, ImageSpec, PixelType};
use tracing::debug;

use crate::cache::CacheInner;
use crate::error::{CacheError, CacheResult};
use crate::perthread::PerThreadInfo;
use crate::reader::{ImageReader, ReaderRegistry};
use crate::stats::ThreadStats;
use crate::texture::{self, CubeLayout, TexFormat, WrapMode};
use crate::tile::{CachedTile, TileId};

/// Everything derived from a file at open time. Replaced wholesale on
/// open and invalidation; readers hold cheap `Arc` snapshots.
pub(crate) struct FileMeta {
    /// Specs for every subimage, index 0 the base level. Synthesized
    /// levels (automip) follow the natural ones. Every entry has nonzero
    /// tile dimensions.
    pub subimages: Vec<ImageSpec>,
    /// Name of the format that decoded the file.
    pub fileformat: String,
    /// Base image lacked native tiles.
    pub untiled: bool,
    /// File contained exactly one natural subimage.
    pub unmipped: bool,
    /// The type tiles of this file are cached at.
    pub datatype: PixelType,
    /// Content hash parsed from the image description, if present.
    pub fingerprint: Option<String>,
    /// Declared texture kind.
    pub texformat: TexFormat,
    /// Horizontal wrap mode.
    pub swrap: WrapMode,
    /// Vertical wrap mode.
    pub twrap: WrapMode,
    /// Cube-face packing, for cube environment files.
    pub cubelayout: CubeLayout,
    /// Whether cube faces are oriented y-up.
    pub y_up: bool,
    /// Local-to-world transform, when the file carries a camera matrix.
    pub local_to_world: Option<[f32; 16]>,
    /// Projection transform, when the file carries a screen matrix.
    pub projection: Option<[f32; 16]>,
}

#[derive(Default)]
pub(crate) struct FileState {
    reader: Option<Box<dyn ImageReader>>,
}

/// One file known to the cache.
pub(crate) struct CachedFile {
    filename: Arc<str>,
    path: PathBuf,
    state: Mutex<FileState>,
    meta: RwLock<Option<Arc<FileMeta>>>,
    broken: AtomicBool,
    used: AtomicBool,
    mip_used: AtomicBool,
    duplicate: RwLock<Weak<CachedFile>>,
    mod_time: Mutex<Option<SystemTime>>,
    bytes_read: AtomicU64,
    tiles_read: AtomicU64,
    times_opened: AtomicU64,
    io_time_ns: AtomicU64,
}

impl CachedFile {
    /// Creates the entry for `filename`, resolving it against the search
    /// path and attempting the first open. Open failures leave a broken
    /// entry behind so later queries fail fast; the error is recorded for
    /// the calling thread.
    pub(crate) fn new(cache: &CacheInner, filename: &str, stats: &ThreadStats) -> Arc<CachedFile> {
        let resolved = cache.resolve_filename(filename);
        let file = Arc::new(CachedFile {
            filename: Arc::from(filename),
            path: resolved
                .clone()
                .unwrap_or_else(|| PathBuf::from(filename)),
            state: Mutex::new(FileState::default()),
            meta: RwLock::new(None),
            broken: AtomicBool::new(false),
            used: AtomicBool::new(true),
            mip_used: AtomicBool::new(false),
            duplicate: RwLock::new(Weak::new()),
            mod_time: Mutex::new(None),
            bytes_read: AtomicU64::new(0),
            tiles_read: AtomicU64::new(0),
            times_opened: AtomicU64::new(0),
            io_time_ns: AtomicU64::new(0),
        });
        if resolved.is_none() {
            file.broken.store(true, Ordering::Release);
            cache.record_error(&CacheError::FileNotFound {
                filename: filename.to_string(),
            });
            return file;
        }
        {
            let mut state = file.state.lock().unwrap();
            let t0 = Instant::now();
            if let Err(err) = file.open_locked(cache, &mut state, stats) {
                cache.record_error(&err);
            }
            let dt = t0.elapsed();
            file.add_io_time(dt);
            ThreadStats::add_time(&stats.file_io_time_ns, dt);
            ThreadStats::add_time(&stats.file_open_time_ns, dt);
        }
        if !file.broken() {
            *file.mod_time.lock().unwrap() = std::fs::metadata(&file.path)
                .ok()
                .and_then(|m| m.modified().ok());
        }
        file
    }

    /// Opens the reader if it is not already open. Must be called with
    /// the state lock held. On the very first open this also enumerates
    /// subimages and builds the file metadata; reopens after handle
    /// eviction skip straight to recreating the reader.
    pub(crate) fn open_locked(
        &self,
        cache: &CacheInner,
        state: &mut FileState,
        stats: &ThreadStats,
    ) -> CacheResult<()> {
        if state.reader.is_some() {
            return Ok(());
        }
        if self.broken() {
            return Err(self.broken_error());
        }
        let config = cache.config();
        let mut reader = ReaderRegistry::global().create(&self.path).map_err(|e| {
            self.broken.store(true, Ordering::Release);
            e
        })?;
        let first = reader.open(&self.path).map_err(|e| {
            self.broken.store(true, Ordering::Release);
            e
        })?;

        if self.meta.read().unwrap().is_some() {
            // Reopen after the handle was evicted: the spec list survives.
            state.reader = Some(reader);
            self.times_opened.fetch_add(1, Ordering::Relaxed);
            cache.reader_opened();
            self.mark_used();
            return Ok(());
        }

        let mut subimages: Vec<ImageSpec> = Vec::new();
        let mut untiled = false;
        let mut spec = first;
        loop {
            if !subimages.is_empty() && spec.nchannels != subimages[0].nchannels {
                self.broken.store(true, Ordering::Release);
                return Err(CacheError::BadSubimage {
                    filename: self.filename.to_string(),
                });
            }
            if spec.tile_width == 0 || spec.tile_height == 0 {
                untiled = true;
                if config.autotile > 0 {
                    spec.tile_width = config.autotile;
                    spec.tile_height = config.autotile;
                } else {
                    // Make it look like one tile as big as the image.
                    spec.tile_width = spec.width.next_power_of_two();
                    spec.tile_height = spec.height.next_power_of_two();
                }
                spec.tile_depth = 1;
            }
            ThreadStats::incr(&stats.files_totalsize, spec.image_bytes(spec.format));
            subimages.push(spec);
            match reader.seek_subimage(subimages.len()) {
                Ok(Some(next)) => spec = next,
                Ok(None) => break,
                Err(err) => {
                    self.broken.store(true, Ordering::Release);
                    return Err(err);
                }
            }
        }

        let unmipped = subimages.len() == 1;
        let has_texformat_attr = subimages[0].attrs.contains("textureformat");
        if untiled && unmipped && config.automip && !has_texformat_attr {
            // Synthesize the missing pyramid down to 1x1. These levels
            // have no pixels in the file; reads against them interpolate
            // from the next finer level.
            let (mut w, mut h) = (subimages[0].full_width, subimages[0].full_height);
            while w > 1 || h > 1 {
                w = (w / 2).max(1);
                h = (h / 2).max(1);
                let mut s = subimages[0].clone();
                s.width = w;
                s.height = h;
                s.full_width = w;
                s.full_height = h;
                if config.autotile > 0 {
                    s.tile_width = config.autotile.min(w);
                    s.tile_height = config.autotile.min(h);
                } else {
                    s.tile_width = w;
                    s.tile_height = h;
                }
                // The sampler requires power-of-two tiles on these levels.
                s.tile_width = s.tile_width.next_power_of_two();
                s.tile_height = s.tile_height.next_power_of_two();
                subimages.push(s);
            }
        }

        if untiled && !config.accept_untiled {
            self.broken.store(true, Ordering::Release);
            return Err(CacheError::RejectUntiled {
                filename: self.filename.to_string(),
            });
        }

        let texformat = subimages[0]
            .attrs
            .get_str("textureformat")
            .and_then(TexFormat::parse)
            .unwrap_or_default();
        if has_texformat_attr && texformat == TexFormat::Texture {
            // Files constructed as plain textures sometimes carry display
            // windows larger than their pixel data; clamp them down.
            for s in &mut subimages {
                s.full_width = s.full_width.min(s.width);
                s.full_height = s.full_height.min(s.height);
            }
        }
        let (swrap, twrap) = subimages[0]
            .attrs
            .get_str("wrapmodes")
            .map(texture::parse_wrapmodes)
            .unwrap_or_default();
        let mut y_up = false;
        let mut cubelayout = CubeLayout::Unknown;
        if texformat == TexFormat::CubeFaceEnv {
            y_up = reader.format_name() == "openexr";
            let s = &subimages[0];
            let w = s.full_width.max(s.tile_width);
            let h = s.full_height.max(s.tile_height);
            cubelayout = if s.width == 3 * w && s.height == 2 * h {
                CubeLayout::ThreeByTwo
            } else if s.width == w && s.height == 6 * h {
                CubeLayout::OneBySix
            } else {
                CubeLayout::Unknown
            };
        }
        let c2w = config.common_to_world;
        let local_to_world = subimages[0]
            .attrs
            .get_matrix("worldtocamera")
            .map(|m| texture::mat4_mul(&c2w, &m));
        let projection = subimages[0]
            .attrs
            .get_matrix("worldtoscreen")
            .map(|m| texture::mat4_mul(&c2w, &m));
        let fingerprint = parse_fingerprint(subimages[0].attrs.get_str("ImageDescription"));
        let datatype = if !config.forcefloat && subimages[0].format == PixelType::UInt8 {
            PixelType::UInt8
        } else {
            PixelType::Float
        };

        let meta = Arc::new(FileMeta {
            subimages,
            fileformat: reader.format_name().to_string(),
            untiled,
            unmipped,
            datatype,
            fingerprint,
            texformat,
            swrap,
            twrap,
            cubelayout,
            y_up,
            local_to_world,
            projection,
        });
        *self.meta.write().unwrap() = Some(meta);
        state.reader = Some(reader);
        self.times_opened.fetch_add(1, Ordering::Relaxed);
        cache.reader_opened();
        self.mark_used();
        debug!(file = %self.filename, "opened");
        Ok(())
    }

    /// Reads one tile's pixels into `data` at `format`, dispatching on
    /// how the file is laid out.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn read_tile(
        file: &Arc<CachedFile>,
        cache: &CacheInner,
        info: &mut PerThreadInfo,
        subimage: usize,
        x: i32,
        y: i32,
        z: i32,
        format: PixelType,
        data: &mut [u8],
    ) -> CacheResult<()> {
        let meta = file.meta()?;
        if subimage > 0 {
            file.mip_used.store(true, Ordering::Relaxed);
        }
        if meta.unmipped && subimage > 0 {
            // Synthesized level: built from the next finer level through
            // the cache itself; the reader lock is only taken by the
            // level-0 leaf reads of that recursion.
            return Self::read_unmipped(file, cache, info, &meta, subimage, x, y, z, format, data);
        }

        let mut state = file.state.lock().unwrap();
        file.open_locked(cache, &mut state, info.stats())?;
        if meta.untiled {
            return Self::read_untiled(
                file, cache, info, &meta, &mut state, subimage, x, y, z, format, data,
            );
        }

        let spec = &meta.subimages[subimage];
        let Some(reader) = state.reader.as_mut() else {
            return Err(file.broken_error());
        };
        if reader.current_subimage() != subimage {
            reader.seek_subimage(subimage)?.ok_or_else(|| {
                CacheError::BadArg(format!(
                    "no subimage {subimage} in \"{}\"",
                    file.filename
                ))
            })?;
        }
        reader.read_tile(x, y, z, format, data)?;
        let b = spec.tile_bytes(format) as u64;
        ThreadStats::incr(&info.stats().bytes_read, b);
        file.bytes_read.fetch_add(b, Ordering::Relaxed);
        file.tiles_read.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Synthesizes a tile of a scanline-oriented file. With autotile on,
    /// one strip of scanlines covers a whole row of tiles, so the
    /// siblings are built and cached in the same pass; with autotile off
    /// the single whole-image tile is read in one call.
    #[allow(clippy::too_many_arguments)]
    fn read_untiled(
        file: &Arc<CachedFile>,
        cache: &CacheInner,
        info: &mut PerThreadInfo,
        meta: &Arc<FileMeta>,
        state: &mut FileState,
        subimage: usize,
        x: i32,
        y: i32,
        z: i32,
        format: PixelType,
        data: &mut [u8],
    ) -> CacheResult<()> {
        let spec = &meta.subimages[subimage];
        if spec.depth > 1 {
            return Err(CacheError::BadArg(format!(
                "\"{}\": tiling an untiled volume is not supported",
                file.filename
            )));
        }
        let Some(reader) = state.reader.as_mut() else {
            return Err(file.broken_error());
        };
        if reader.current_subimage() != subimage {
            reader.seek_subimage(subimage)?.ok_or_else(|| {
                CacheError::BadArg(format!(
                    "no subimage {subimage} in \"{}\"",
                    file.filename
                ))
            })?;
        }

        let tw = spec.tile_width as i32;
        let th = spec.tile_height as i32;
        let w = spec.width as i32;
        let h = spec.height as i32;
        let pixel_bytes = spec.pixel_bytes(format);

        if cache.config().autotile > 0 {
            // Strip buffer rows are rounded up to a multiple of the tile
            // width so every tile's columns are contiguous per row.
            let buf_width = (w + tw - 1) / tw * tw;
            let row_pitch = buf_width as usize * pixel_bytes;
            let mut strip = vec![0u8; row_pitch * th as usize];
            let yy = y - spec.y;
            let y0 = yy - yy % th;
            let y1 = (y0 + th - 1).min(h - 1);
            let scanline_bytes = spec.scanline_bytes(format);
            for (i, sl) in (y0..=y1).enumerate() {
                reader.read_scanline(
                    sl + spec.y,
                    z,
                    format,
                    &mut strip[i * row_pitch..][..scanline_bytes],
                )?;
            }
            let b = (y1 - y0 + 1) as u64 * scanline_bytes as u64;
            ThreadStats::incr(&info.stats().bytes_read, b);
            file.bytes_read.fetch_add(b, Ordering::Relaxed);
            file.tiles_read.fetch_add(1, Ordering::Relaxed);

            let xx = x - spec.x;
            let x0 = xx - xx % tw;
            let tile_row = tw as usize * pixel_bytes;
            for row in 0..th as usize {
                data[row * tile_row..][..tile_row].copy_from_slice(
                    &strip[row * row_pitch + x0 as usize * pixel_bytes..][..tile_row],
                );
            }

            // The rest of the strip was read anyway; cache those tiles
            // too, since adjacent queries are very likely to want them.
            let mut col = 0i32;
            while col < w {
                if col != x0 {
                    let id = TileId::new(file.clone(), subimage, col + spec.x, y0 + spec.y, z);
                    if !cache.tile_in_cache(&id) {
                        let tile = CachedTile::from_strip(
                            cache,
                            id,
                            format,
                            spec.tile_width,
                            spec.tile_height,
                            pixel_bytes,
                            &strip,
                            row_pitch,
                            col as usize * pixel_bytes,
                        );
                        cache.add_tile_to_cache(tile);
                    }
                }
                col += tw;
            }
            Ok(())
        } else {
            // No autotile: the single tile is the whole image, with rows
            // placed at the synthetic tile width.
            reader.read_image(format, data, tw as usize * pixel_bytes)?;
            let b = spec.image_bytes(format);
            ThreadStats::incr(&info.stats().bytes_read, b);
            file.bytes_read.fetch_add(b, Ordering::Relaxed);
            file.tiles_read.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Builds a tile of a synthesized MIP level by bilinearly filtering
    /// the next finer level with the half-pixel-offset convention. The
    /// finer level is fetched through the cache, so this recurses until
    /// it reaches tiles that exist in the file.
    #[allow(clippy::too_many_arguments)]
    fn read_unmipped(
        file: &Arc<CachedFile>,
        cache: &CacheInner,
        info: &mut PerThreadInfo,
        meta: &Arc<FileMeta>,
        subimage: usize,
        x: i32,
        y: i32,
        _z: i32,
        format: PixelType,
        data: &mut [u8],
    ) -> CacheResult<()> {
        let spec = &meta.subimages[subimage];
        let up = &meta.subimages[subimage - 1];
        let tw = spec.tile_width as i32;
        let th = spec.tile_height as i32;
        let nch = spec.nchannels as usize;
        let xx = x - spec.x;
        let yy = y - spec.y;
        let x0 = xx - xx % tw;
        let x1 = (x0 + tw - 1).min(spec.full_width as i32 - 1);
        let y0 = yy - yy % th;
        let y1 = (y0 + th - 1).min(spec.full_height as i32 - 1);

        let mut scratch = vec![0.0f32; (tw * th) as usize * nch];
        let mut corner = vec![0u8; 4 * nch * PixelType::Float.size()];
        let mut ok = true;
        for j in y0..=y1 {
            let yf = (j as f32 + 0.5) / spec.full_height as f32;
            let (ylow, yfrac) = floorfrac(yf * up.full_height as f32 - 0.5);
            for i in x0..=x1 {
                let xf = (i as f32 + 0.5) / spec.full_width as f32;
                let (xlow, xfrac) = floorfrac(xf * up.full_width as f32 - 0.5);
                ok &= cache
                    .get_pixels_of_file(
                        file,
                        info,
                        subimage - 1,
                        xlow,
                        xlow + 2,
                        ylow,
                        ylow + 2,
                        0,
                        1,
                        PixelType::Float,
                        &mut corner,
                    )
                    .is_ok();
                let at = |idx: usize| convert::value_to_f32(PixelType::Float, &corner, idx);
                let out =
                    &mut scratch[((j - y0) * tw + (i - x0)) as usize * nch..][..nch];
                for (c, o) in out.iter_mut().enumerate() {
                    let top = lerp(at(c), at(nch + c), xfrac);
                    let bottom = lerp(at(2 * nch + c), at(3 * nch + c), xfrac);
                    *o = lerp(top, bottom, yfrac);
                }
            }
        }
        convert::f32_slice_to_values(&scratch, format, data);
        if ok {
            Ok(())
        } else {
            Err(CacheError::ReadFailure {
                filename: file.filename.to_string(),
                reason: "failed reading pixels for level synthesis".into(),
            })
        }
    }

    /// Clock visit for open-handle eviction: a set used bit buys a
    /// second chance, otherwise the reader is closed (the entry stays).
    pub(crate) fn release(&self, cache: &CacheInner) {
        let mut state = self.state.lock().unwrap();
        if !self.used.swap(false, Ordering::AcqRel) {
            self.close_locked(cache, &mut state);
        }
    }

    /// Closes the reader if open.
    pub(crate) fn close_reader(&self, cache: &CacheInner) {
        let mut state = self.state.lock().unwrap();
        self.close_locked(cache, &mut state);
    }

    fn close_locked(&self, cache: &CacheInner, state: &mut FileState) {
        if state.reader.take().is_some() {
            cache.reader_closed();
            debug!(file = %self.filename, "closed reader");
        }
    }

    /// Resets the file for a fresh load: closes the reader, discards the
    /// metadata, clears brokenness, fingerprint, and duplicate status,
    /// then reopens so the spec and modification time are current.
    pub(crate) fn invalidate(&self, cache: &CacheInner, stats: &ThreadStats) {
        let mut state = self.state.lock().unwrap();
        self.close_locked(cache, &mut state);
        *self.meta.write().unwrap() = None;
        self.broken.store(false, Ordering::Release);
        *self.duplicate.write().unwrap() = Weak::new();
        if let Err(err) = self.open_locked(cache, &mut state, stats) {
            cache.record_error(&err);
        }
        *self.mod_time.lock().unwrap() = std::fs::metadata(&self.path)
            .ok()
            .and_then(|m| m.modified().ok());
    }

    /// The file metadata, or the fail-fast error for broken files.
    pub(crate) fn meta(&self) -> CacheResult<Arc<FileMeta>> {
        if let Some(m) = self.meta.read().unwrap().as_ref() {
            if !self.broken() {
                return Ok(m.clone());
            }
        }
        Err(self.broken_error())
    }

    fn broken_error(&self) -> CacheError {
        CacheError::OpenFailure {
            filename: self.filename.to_string(),
            reason: "file is invalid or could not be opened".into(),
        }
    }

    /// Whether the two files may be treated as the same content: equal
    /// fingerprints are not enough, the sampling-relevant metadata must
    /// agree too.
    pub(crate) fn dedup_compatible(&self, other: &CachedFile) -> bool {
        let mine = self.meta.read().unwrap();
        let theirs = other.meta.read().unwrap();
        match (mine.as_ref(), theirs.as_ref()) {
            (Some(a), Some(b)) => {
                a.swrap == b.swrap
                    && a.twrap == b.twrap
                    && a.datatype == b.datatype
                    && a.cubelayout == b.cubelayout
                    && a.y_up == b.y_up
            }
            _ => false,
        }
    }

    #[inline]
    pub(crate) fn filename(&self) -> &str {
        &self.filename
    }

    #[inline]
    pub(crate) fn filename_arc(&self) -> Arc<str> {
        self.filename.clone()
    }

    #[inline]
    pub(crate) fn path(&self) -> &std::path::Path {
        &self.path
    }

    #[inline]
    pub(crate) fn broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn mark_used(&self) {
        self.used.store(true, Ordering::Release);
    }

    /// The fingerprint, if the file carries one.
    pub(crate) fn fingerprint(&self) -> Option<String> {
        self.meta
            .read()
            .unwrap()
            .as_ref()
            .and_then(|m| m.fingerprint.clone())
    }

    /// The canonical file this one duplicates, if any.
    pub(crate) fn duplicate(&self) -> Option<Arc<CachedFile>> {
        self.duplicate.read().unwrap().upgrade()
    }

    pub(crate) fn set_duplicate(&self, canonical: Weak<CachedFile>) {
        *self.duplicate.write().unwrap() = canonical;
    }

    #[inline]
    pub(crate) fn mip_used(&self) -> bool {
        self.mip_used.load(Ordering::Relaxed)
    }

    pub(crate) fn mod_time(&self) -> Option<SystemTime> {
        *self.mod_time.lock().unwrap()
    }

    #[inline]
    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn tiles_read(&self) -> u64 {
        self.tiles_read.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn times_opened(&self) -> u64 {
        self.times_opened.load(Ordering::Relaxed)
    }

    pub(crate) fn io_time(&self) -> Duration {
        Duration::from_nanos(self.io_time_ns.load(Ordering::Relaxed))
    }

    pub(crate) fn add_io_time(&self, dt: Duration) {
        self.io_time_ns
            .fetch_add(dt.as_nanos() as u64, Ordering::Relaxed);
    }
}

/// Extracts the 40-hex-character content hash from an image description
/// of the form `... SHA-1=<hash>`.
fn parse_fingerprint(description: Option<&str>) -> Option<String> {
    const PREFIX: &str = "SHA-1=";
    let desc = description?;
    let at = desc.rfind(PREFIX)?;
    let hash = desc[at + PREFIX.len()..].get(..40)?;
    hash.chars()
        .all(|c| c.is_ascii_hexdigit())
        .then(|| hash.to_string())
}

#[inline]
fn floorfrac(v: f32) -> (i32, f32) {
    let f = v.floor();
    (f as i32, v - f)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_parses_suffix() {
        let hash = "0123456789abcdef0123456789abcdef01234567";
        let desc = format!("rendered by something SHA-1={hash}");
        assert_eq!(parse_fingerprint(Some(&desc)), Some(hash.to_string()));
    }

    #[test]
    fn fingerprint_rejects_short_or_nonhex() {
        assert_eq!(parse_fingerprint(Some("SHA-1=abc")), None);
        assert_eq!(
            parse_fingerprint(Some(
                "SHA-1=zzzz456789abcdef0123456789abcdef01234567"
            )),
            None
        );
        assert_eq!(parse_fingerprint(Some("no hash here")), None);
        assert_eq!(parse_fingerprint(None), None);
    }

    #[test]
    fn fingerprint_uses_last_occurrence() {
        let h1 = "1111111111111111111111111111111111111111";
        let h2 = "2222222222222222222222222222222222222222";
        let desc = format!("SHA-1={h1} then later SHA-1={h2}");
        assert_eq!(parse_fingerprint(Some(&desc)), Some(h2.to_string()));
    }

    #[test]
    fn floorfrac_splits() {
        let (i, f) = floorfrac(3.25);
        assert_eq!(i, 3);
        assert!((f - 0.25).abs() < 1e-6);
        let (i, f) = floorfrac(-0.5);
        assert_eq!(i, -1);
        assert!((f - 0.5).abs() < 1e-6);
    }

    #[test]
    fn lerp_endpoints() {
        assert_eq!(lerp(2.0, 4.0, 0.0), 2.0);
        assert_eq!(lerp(2.0, 4.0, 1.0), 4.0);
        assert_eq!(lerp(2.0, 4.0, 0.5), 3.0);
    }
}
