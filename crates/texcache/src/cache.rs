//! The cache facade: tables, eviction, queries, and configuration.
//!
//! Two independent reader-writer locks guard the two tables: the file
//! table (filename -> file, plus the fingerprint table for content
//! deduplication) and the tile table (tile id -> tile). Both locks are
//! held only across hash-table operations; file opens and tile reads
//! happen outside them, so one slow disk read never stalls unrelated
//! queries. The price is that two threads racing on the same key may
//! both do the work, with the last insert winning.
//!
//! Eviction is clock-style second chance on both tables: visiting an
//! entry clears its `used` bit, and an entry found with the bit already
//! clear (and unpinned) is evicted.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use texcache_core::{convert, AttrValue, ImageSpec, PixelType};
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::file::CachedFile;
use crate::perthread::{self, PerThreadInfo, ThreadShared};
use crate::stats::{memformat, timeformat, CacheStats, ThreadStats};
use crate::tile::{CachedTile, TileHandle, TileId};

/// Runtime configuration, replaced wholesale on each `attribute` call so
/// queries can snapshot it with one `Arc` clone.
#[derive(Debug, Clone)]
pub(crate) struct CacheConfig {
    pub max_open_files: usize,
    pub max_memory_mb: f32,
    pub max_memory_bytes: usize,
    pub searchpath: String,
    pub searchdirs: Vec<PathBuf>,
    pub statslevel: i32,
    pub autotile: u32,
    pub automip: bool,
    pub forcefloat: bool,
    pub accept_untiled: bool,
    pub world_to_common: [f32; 16],
    pub common_to_world: [f32; 16],
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_open_files: 100,
            max_memory_mb: 50.0,
            max_memory_bytes: 50 * 1024 * 1024,
            searchpath: String::new(),
            searchdirs: Vec::new(),
            statslevel: 0,
            autotile: 0,
            automip: false,
            forcefloat: false,
            accept_untiled: true,
            world_to_common: crate::texture::MAT4_IDENTITY,
            common_to_world: crate::texture::MAT4_IDENTITY,
        }
    }
}

struct FileTable {
    map: HashMap<Arc<str>, Arc<CachedFile>>,
    /// fingerprint -> canonical file, for content deduplication.
    fingerprints: HashMap<String, Arc<CachedFile>>,
    /// Second-chance ring over filenames for open-handle eviction.
    clock: VecDeque<Arc<str>>,
}

struct TileTable {
    map: HashMap<TileId, Arc<CachedTile>>,
    /// Second-chance ring over tile ids for byte-budget eviction. Stale
    /// entries (evicted or invalidated ids) are skipped lazily.
    clock: VecDeque<TileId>,
}

/// Shared cache state; the [`ImageCache`] facade is a handle over it.
pub(crate) struct CacheInner {
    id: u64,
    config: RwLock<Arc<CacheConfig>>,
    files: RwLock<FileTable>,
    tiles: RwLock<TileTable>,
    mem_used: Arc<AtomicUsize>,
    mem_peak: AtomicUsize,
    open_files: AtomicUsize,
    open_files_created: AtomicU64,
    open_files_peak: AtomicUsize,
    tiles_created: AtomicU64,
    tiles_peak: AtomicUsize,
    threads: Mutex<Vec<Arc<ThreadShared>>>,
}

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

impl CacheInner {
    fn new() -> Self {
        Self {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            config: RwLock::new(Arc::new(CacheConfig::default())),
            files: RwLock::new(FileTable {
                map: HashMap::new(),
                fingerprints: HashMap::new(),
                clock: VecDeque::new(),
            }),
            tiles: RwLock::new(TileTable {
                map: HashMap::new(),
                clock: VecDeque::new(),
            }),
            mem_used: Arc::new(AtomicUsize::new(0)),
            mem_peak: AtomicUsize::new(0),
            open_files: AtomicUsize::new(0),
            open_files_created: AtomicU64::new(0),
            open_files_peak: AtomicUsize::new(0),
            tiles_created: AtomicU64::new(0),
            tiles_peak: AtomicUsize::new(0),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn config(&self) -> Arc<CacheConfig> {
        self.config.read().unwrap().clone()
    }

    /// Appends a query error to the calling thread's error buffer.
    pub(crate) fn record_error(&self, err: &CacheError) {
        debug!(error = %err, "cache error");
        perthread::append_error(self.id, &err.to_string());
    }

    /// Resolves a filename against the configured search directories.
    pub(crate) fn resolve_filename(&self, filename: &str) -> Option<PathBuf> {
        let p = PathBuf::from(filename);
        if p.exists() {
            return Some(p);
        }
        if p.is_absolute() {
            return None;
        }
        for dir in &self.config().searchdirs {
            let candidate = dir.join(filename);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    pub(crate) fn reader_opened(&self) {
        self.open_files_created.fetch_add(1, Ordering::Relaxed);
        let n = self.open_files.fetch_add(1, Ordering::Relaxed) + 1;
        self.open_files_peak.fetch_max(n, Ordering::Relaxed);
    }

    pub(crate) fn reader_closed(&self) {
        self.open_files.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn charge_tile_memory(&self, bytes: usize) {
        let new = self.mem_used.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.mem_peak.fetch_max(new, Ordering::Relaxed);
    }

    pub(crate) fn mem_counter(&self) -> Arc<AtomicUsize> {
        self.mem_used.clone()
    }

    /// Raises every registered thread's purge flag; each thread clears
    /// its own micro-cache on its next entry into the cache.
    fn purge_perthread_caches(&self) {
        let threads = self.threads.lock().unwrap();
        for t in threads.iter() {
            t.purge.store(true, Ordering::Release);
        }
    }

    /// Returns the canonical entry for `filename`, creating (and opening)
    /// it if this is the first reference. Construction happens with no
    /// table lock held; if another thread won the race to insert, its
    /// entry wins and ours is discarded.
    pub(crate) fn find_file(&self, filename: &str, info: &mut PerThreadInfo) -> Arc<CachedFile> {
        {
            let files = self.files.read().unwrap();
            if let Some(f) = files.map.get(filename) {
                let f = f.duplicate().unwrap_or_else(|| f.clone());
                f.mark_used();
                return f;
            }
        }

        let file = CachedFile::new(self, filename, info.stats());

        let mut files = self.files.write().unwrap();
        if let Some(existing) = files.map.get(filename) {
            file.close_reader(self);
            let f = existing.duplicate().unwrap_or_else(|| existing.clone());
            f.mark_used();
            return f;
        }

        // Different names, same pixels: if an earlier file carries the
        // same content fingerprint and agrees on the sampling-relevant
        // metadata, this one becomes a duplicate and drops its reader.
        if let Some(fp) = file.fingerprint() {
            match files.fingerprints.get(&fp) {
                None => {
                    files.fingerprints.insert(fp, file.clone());
                }
                Some(canonical) => {
                    if file.dedup_compatible(canonical) {
                        debug!(
                            file = filename,
                            canonical = canonical.filename(),
                            "content duplicate"
                        );
                        file.set_duplicate(Arc::downgrade(canonical));
                        file.close_reader(self);
                    }
                }
            }
        }

        self.check_max_files_locked(&mut files);
        files.clock.push_back(file.filename_arc());
        files.map.insert(file.filename_arc(), file.clone());
        let canonical = file.duplicate().unwrap_or_else(|| file.clone());
        if Arc::ptr_eq(&canonical, &file) {
            ThreadStats::incr(&info.stats().unique_files, 1);
        }
        canonical.mark_used();
        canonical
    }

    /// Clock sweep closing readers until the open count is within budget
    /// or a bounded walk makes no progress. Entries stay in the table;
    /// only their readers close.
    fn check_max_files_locked(&self, files: &mut FileTable) {
        let max = self.config().max_open_files.max(1);
        let limit = 2 * files.clock.len() + 2;
        let mut steps = 0usize;
        while self.open_files.load(Ordering::Relaxed) >= max && steps < limit {
            let Some(name) = files.clock.pop_front() else {
                break;
            };
            steps += 1;
            if let Some(f) = files.map.get(&name) {
                f.release(self);
                files.clock.push_back(name);
            }
        }
    }

    /// Resolves a tile id through the per-thread micro-cache, then the
    /// main table, reading on miss. The looked-up tile becomes the
    /// thread's current tile; the previous current tile rolls into the
    /// `lasttile` slot.
    pub(crate) fn find_tile(&self, id: &TileId, info: &mut PerThreadInfo) -> Arc<CachedTile> {
        ThreadStats::incr(&info.stats().find_tile_calls, 1);
        if let Some(t) = &info.tile {
            if t.id() == id {
                t.mark_used();
                return t.clone();
            }
        }
        if info.lasttile.as_ref().is_some_and(|t| t.id() == id) {
            std::mem::swap(&mut info.tile, &mut info.lasttile);
            if let Some(t) = &info.tile {
                t.mark_used();
                return t.clone();
            }
        }
        ThreadStats::incr(&info.stats().find_tile_microcache_misses, 1);
        let tile = self.find_tile_main(id, info);
        info.lasttile = info.tile.replace(tile.clone());
        tile
    }

    /// Main-table lookup, bypassing the micro-cache. On miss the tile is
    /// constructed and read with no table lock held; two threads racing
    /// the same miss may both read it, and the last insert wins.
    pub(crate) fn find_tile_main(&self, id: &TileId, info: &mut PerThreadInfo) -> Arc<CachedTile> {
        {
            let tiles = self.tiles.read().unwrap();
            if let Some(t) = tiles.map.get(id) {
                t.mark_used();
                return t.clone();
            }
        }
        ThreadStats::incr(&info.stats().find_tile_cache_misses, 1);
        let tile = CachedTile::read(self, info, id.clone());
        self.add_tile_to_cache(tile.clone());
        tile
    }

    pub(crate) fn tile_in_cache(&self, id: &TileId) -> bool {
        self.tiles.read().unwrap().map.contains_key(id)
    }

    pub(crate) fn add_tile_to_cache(&self, tile: Arc<CachedTile>) {
        let mut tiles = self.tiles.write().unwrap();
        self.check_max_mem_locked(&mut tiles);
        tiles.clock.push_back(tile.id().clone());
        tiles.map.insert(tile.id().clone(), tile);
        self.tiles_created.fetch_add(1, Ordering::Relaxed);
        self.tiles_peak.fetch_max(tiles.map.len(), Ordering::Relaxed);
    }

    /// Clock sweep evicting tiles until resident bytes fit the budget or
    /// a bounded walk makes no progress. A set `used` bit buys a second
    /// chance; a pin (any reference besides the table's own) exempts the
    /// tile entirely.
    fn check_max_mem_locked(&self, tiles: &mut TileTable) {
        if tiles.map.is_empty() {
            return;
        }
        let max = self.config().max_memory_bytes;
        let limit = 2 * tiles.clock.len() + 2;
        let mut steps = 0usize;
        while self.mem_used.load(Ordering::Relaxed) >= max && steps < limit {
            let Some(id) = tiles.clock.pop_front() else {
                break;
            };
            steps += 1;
            let Some(tile) = tiles.map.get(&id) else {
                continue;
            };
            if Arc::strong_count(tile) > 1 || tile.clear_used() {
                tiles.clock.push_back(id);
            } else {
                tiles.map.remove(&id);
            }
        }
    }

    /// Copies a rectangular region of one subimage into `out`, resolving
    /// each covered tile through [`find_tile`](Self::find_tile). Missing
    /// or invalid tiles contribute zeros; the call fails only afterwards,
    /// with the whole buffer filled.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn get_pixels_of_file(
        &self,
        file: &Arc<CachedFile>,
        info: &mut PerThreadInfo,
        subimage: usize,
        xbegin: i32,
        xend: i32,
        ybegin: i32,
        yend: i32,
        zbegin: i32,
        zend: i32,
        format: PixelType,
        out: &mut [u8],
    ) -> CacheResult<()> {
        let meta = file.meta()?;
        let Some(spec) = meta.subimages.get(subimage) else {
            return Err(CacheError::BadArg(format!(
                "no subimage {subimage} in \"{}\"",
                file.filename()
            )));
        };
        let nch = spec.nchannels as usize;
        let pixel_bytes = nch * format.size();
        let npixels = (xend - xbegin) as i64 * (yend - ybegin) as i64 * (zend - zbegin) as i64;
        if npixels <= 0 {
            return Ok(());
        }
        if out.len() < npixels as usize * pixel_bytes {
            return Err(CacheError::BadArg(
                "output buffer too small for requested region".into(),
            ));
        }
        let tw = spec.tile_width as i32;
        let th = spec.tile_height as i32;
        let td = spec.tile_depth.max(1) as i32;
        let datatype = meta.datatype;

        let mut ok = true;
        let mut offset = 0usize;
        for z in zbegin..zend {
            let tz = z - z % td;
            for y in ybegin..yend {
                let ty = y - y % th;
                for x in xbegin..xend {
                    let tx = x - x % tw;
                    let id = TileId::new(file.clone(), subimage, tx, ty, tz);
                    let tile = self.find_tile(&id, info);
                    let mut filled = false;
                    if tile.valid() {
                        if let Some(src) = tile.data(x, y, z) {
                            convert::convert_values(
                                datatype,
                                src,
                                format,
                                &mut out[offset..],
                                nch,
                            );
                            filled = true;
                        }
                    } else {
                        ok = false;
                    }
                    if !filled {
                        out[offset..offset + pixel_bytes].fill(0);
                    }
                    offset += pixel_bytes;
                }
            }
        }
        if ok {
            Ok(())
        } else {
            Err(CacheError::ReadFailure {
                filename: file.filename().to_string(),
                reason: "one or more tiles failed to read".into(),
            })
        }
    }

    fn merged_stats(&self) -> CacheStats {
        let mut total = CacheStats::default();
        let threads = self.threads.lock().unwrap();
        for t in threads.iter() {
            total.merge(&t.stats);
        }
        total
    }

    /// Renders the human-readable statistics report. Level 1 is a
    /// summary; level 2 adds a per-file table.
    fn report(&self, level: i32) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        if level <= 0 {
            return out;
        }
        let stats = self.merged_stats();
        let _ = writeln!(out, "texcache statistics:");
        if stats.unique_files > 0 {
            let _ = writeln!(out, "  Images : {} unique", stats.unique_files);
            let _ = writeln!(
                out,
                "    ImageReaders : {} created, {} current, {} peak",
                self.open_files_created.load(Ordering::Relaxed),
                self.open_files.load(Ordering::Relaxed),
                self.open_files_peak.load(Ordering::Relaxed)
            );
            let _ = writeln!(
                out,
                "    Total size of all images referenced : {}",
                memformat(stats.files_totalsize)
            );
            let _ = writeln!(out, "    Read from disk : {}", memformat(stats.bytes_read));
            if stats.file_io_time_ns > 0 {
                let _ = writeln!(
                    out,
                    "    File I/O time : {}",
                    timeformat(stats.file_io_time())
                );
            }
        } else {
            let _ = writeln!(out, "  No images opened");
        }
        let tiles_created = self.tiles_created.load(Ordering::Relaxed);
        if tiles_created > 0 {
            let _ = writeln!(
                out,
                "  Tiles: {} created, {} current, {} peak",
                tiles_created,
                self.tiles.read().unwrap().map.len(),
                self.tiles_peak.load(Ordering::Relaxed)
            );
            let _ = writeln!(
                out,
                "    total tile requests : {}",
                stats.find_tile_calls
            );
            if stats.find_tile_calls > 0 {
                let pct = |n: u64| 100.0 * n as f64 / stats.find_tile_calls as f64;
                let _ = writeln!(
                    out,
                    "    micro-cache misses : {} ({:.1}%)",
                    stats.find_tile_microcache_misses,
                    pct(stats.find_tile_microcache_misses)
                );
                let _ = writeln!(
                    out,
                    "    main cache misses : {} ({:.1}%)",
                    stats.find_tile_cache_misses,
                    pct(stats.find_tile_cache_misses)
                );
            }
        }
        let _ = writeln!(
            out,
            "    Peak cache memory : {}",
            memformat(self.mem_peak.load(Ordering::Relaxed) as u64)
        );

        if level >= 2 {
            let mut files: Vec<Arc<CachedFile>> = {
                let table = self.files.read().unwrap();
                table.map.values().cloned().collect()
            };
            files.sort_by(|a, b| a.filename().cmp(b.filename()));
            if !files.is_empty() {
                let _ = writeln!(out, "  Image file statistics:");
                let _ = writeln!(
                    out,
                    "        opens   tiles  MB read  I/O time  res                File"
                );
                let automip = self.config().automip;
                for (i, f) in files.iter().enumerate() {
                    if f.broken() {
                        let _ = writeln!(out, "  BROKEN  {}", f.filename());
                        continue;
                    }
                    let Ok(meta) = f.meta() else {
                        continue;
                    };
                    let spec = &meta.subimages[0];
                    let _ = write!(
                        out,
                        "  {:5}  {:4}   {:5}  {:7.1}  {:>8}  {:4}x{:4}x{}.{}  {}",
                        i + 1,
                        f.times_opened(),
                        f.tiles_read(),
                        f.bytes_read() as f64 / (1024.0 * 1024.0),
                        timeformat(f.io_time()),
                        spec.width,
                        spec.height,
                        spec.nchannels,
                        spec.format.code(),
                        f.filename()
                    );
                    if let Some(canonical) = f.duplicate() {
                        let _ = write!(out, " DUPLICATES {}", canonical.filename());
                    } else {
                        if meta.untiled {
                            let _ = write!(out, " UNTILED");
                        }
                        if meta.unmipped && automip {
                            let _ = write!(out, " UNMIPPED");
                        }
                        if !meta.unmipped && !f.mip_used() {
                            let _ = write!(out, " MIP-UNUSED");
                        }
                    }
                    let _ = writeln!(out);
                }
            }
        }
        out
    }
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        let level = self.config().statslevel;
        if level > 0 {
            tracing::info!(target: "texcache::stats", "\n{}", self.report(level));
        }
    }
}

fn split_searchpath(s: &str) -> Vec<PathBuf> {
    s.split([':', ';'])
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

static SHARED_CACHE: OnceLock<Mutex<Option<Arc<CacheInner>>>> = OnceLock::new();

/// A handle to a tiled image cache.
///
/// Handles are cheap to clone-by-create: a shared handle
/// ([`create(true)`](Self::create)) refers to one process-wide cache, and
/// destroying a shared handle leaves the underlying cache alive for other
/// holders. A private handle owns its cache; dropping the last one tears
/// the cache down (emitting the statistics dump if configured).
///
/// All methods are safe to call from many threads concurrently.
pub struct ImageCache {
    inner: Arc<CacheInner>,
    shared: bool,
}

impl ImageCache {
    /// Creates a cache handle. With `shared`, returns a handle to the
    /// process-wide singleton cache, creating it on first use.
    pub fn create(shared: bool) -> ImageCache {
        if shared {
            let slot = SHARED_CACHE.get_or_init(|| Mutex::new(None));
            let mut guard = slot.lock().unwrap();
            let inner = guard
                .get_or_insert_with(|| Arc::new(CacheInner::new()))
                .clone();
            ImageCache {
                inner,
                shared: true,
            }
        } else {
            ImageCache {
                inner: Arc::new(CacheInner::new()),
                shared: false,
            }
        }
    }

    /// Creates a private (non-shared) cache.
    pub fn new() -> ImageCache {
        Self::create(false)
    }

    /// Destroys a handle. For shared handles the underlying cache
    /// survives for other holders (and future `create(true)` calls).
    pub fn destroy(cache: ImageCache) {
        drop(cache);
    }

    /// Whether this handle refers to the process-wide shared cache.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    fn with_info<R>(&self, f: impl FnOnce(&CacheInner, &mut PerThreadInfo) -> R) -> R {
        let inner = &self.inner;
        perthread::with_info(inner.id, &inner.threads, |info| f(inner, info))
    }

    /// Sets a configuration option. Returns false for unrecognized names
    /// or mismatched value types.
    ///
    /// | name | type |
    /// |---|---|
    /// | `max_open_files` | int |
    /// | `max_memory_MB` | float or int |
    /// | `searchpath` | string (`:`/`;`-separated directories) |
    /// | `statistics:level` | int |
    /// | `autotile` | int (rounded up to a power of two) |
    /// | `automip` | int (as bool) |
    /// | `forcefloat` | int (as bool) |
    /// | `accept_untiled` | int (as bool) |
    pub fn attribute(&self, name: &str, value: impl Into<AttrValue>) -> bool {
        let value = value.into();
        let mut config = self.inner.config.write().unwrap();
        let mut c: CacheConfig = (**config).clone();
        let accepted = match (name, &value) {
            ("max_open_files", AttrValue::Int(v)) => {
                c.max_open_files = (*v).max(0) as usize;
                true
            }
            ("max_memory_MB", v) => match v.as_float() {
                Some(mb) if mb > 0.0 => {
                    c.max_memory_mb = mb;
                    c.max_memory_bytes = (mb as f64 * 1024.0 * 1024.0) as usize;
                    true
                }
                _ => false,
            },
            ("searchpath", AttrValue::Str(s)) => {
                c.searchpath = s.clone();
                c.searchdirs = split_searchpath(s);
                true
            }
            ("statistics:level", AttrValue::Int(v)) => {
                c.statslevel = *v;
                true
            }
            ("autotile", AttrValue::Int(v)) => {
                let mut t = (*v).max(0) as u32;
                if t > 0 {
                    t = t.next_power_of_two();
                    // Clamp so a "1" from someone treating this as a
                    // boolean doesn't produce absurd 1x1 tiles.
                    if !cfg!(debug_assertions) && t < 8 {
                        t = 8;
                    }
                }
                c.autotile = t;
                true
            }
            ("automip", AttrValue::Int(v)) => {
                c.automip = *v != 0;
                true
            }
            ("forcefloat", AttrValue::Int(v)) => {
                c.forcefloat = *v != 0;
                true
            }
            ("accept_untiled", AttrValue::Int(v)) => {
                c.accept_untiled = *v != 0;
                true
            }
            _ => false,
        };
        if accepted {
            *config = Arc::new(c);
        }
        accepted
    }

    /// Reads back a configuration option, or `None` for unknown names.
    /// `worldtocommon`/`commontoworld` expose the configured transforms.
    pub fn get_attribute(&self, name: &str) -> Option<AttrValue> {
        let c = self.inner.config();
        match name {
            "max_open_files" => Some(AttrValue::Int(c.max_open_files as i32)),
            "max_memory_MB" => Some(AttrValue::Float(c.max_memory_mb)),
            "searchpath" => Some(AttrValue::Str(c.searchpath.clone())),
            "statistics:level" => Some(AttrValue::Int(c.statslevel)),
            "autotile" => Some(AttrValue::Int(c.autotile as i32)),
            "automip" => Some(AttrValue::Int(c.automip as i32)),
            "forcefloat" => Some(AttrValue::Int(c.forcefloat as i32)),
            "accept_untiled" => Some(AttrValue::Int(c.accept_untiled as i32)),
            "worldtocommon" => Some(AttrValue::Matrix(c.world_to_common)),
            "commontoworld" => Some(AttrValue::Matrix(c.common_to_world)),
            _ => None,
        }
    }

    /// Copies the spec of one subimage of `filename`.
    pub fn get_imagespec(&self, filename: &str, subimage: usize) -> CacheResult<ImageSpec> {
        self.with_info(|inner, info| {
            let file = inner.find_file(filename, info);
            let meta = file.meta().map_err(|e| {
                inner.record_error(&e);
                e
            })?;
            match meta.subimages.get(subimage) {
                Some(s) => Ok(s.clone()),
                None => {
                    let err = CacheError::BadArg(format!(
                        "unknown subimage {} (out of {}) in \"{filename}\"",
                        subimage,
                        meta.subimages.len()
                    ));
                    inner.record_error(&err);
                    Err(err)
                }
            }
        })
    }

    /// Returns a well-known piece of metadata about a file, or falls back
    /// to a generic attribute lookup on subimage 0.
    ///
    /// Recognized names: `resolution`, `texturetype`, `textureformat`,
    /// `fileformat`, `channels`, `format`, `cachedformat`.
    pub fn get_image_info(&self, filename: &str, dataname: &str) -> CacheResult<AttrValue> {
        self.with_info(|inner, info| {
            let file = inner.find_file(filename, info);
            let meta = file.meta().map_err(|e| {
                inner.record_error(&e);
                e
            })?;
            let spec = &meta.subimages[0];
            let value = match dataname {
                "resolution" => Some(AttrValue::IntList(vec![
                    spec.width as i32,
                    spec.height as i32,
                ])),
                "texturetype" => Some(AttrValue::Str(meta.texformat.type_name().to_string())),
                "textureformat" => {
                    Some(AttrValue::Str(meta.texformat.format_name().to_string()))
                }
                "fileformat" => Some(AttrValue::Str(meta.fileformat.clone())),
                "channels" => Some(AttrValue::Int(spec.nchannels as i32)),
                "format" => Some(AttrValue::Str(spec.format.name().to_string())),
                "cachedformat" | "cachedpixeltype" => {
                    Some(AttrValue::Str(meta.datatype.name().to_string()))
                }
                other => spec.attrs.get(other).cloned(),
            };
            value.ok_or_else(|| {
                let err =
                    CacheError::BadArg(format!("unknown image info \"{dataname}\""));
                inner.record_error(&err);
                err
            })
        })
    }

    /// Copies the pixels of the half-open region
    /// `[xbegin,xend) x [ybegin,yend) x [zbegin,zend)` of one subimage
    /// into `out`, converting to `format`. `out` advances contiguously in
    /// channel-interleaved row-major order. Pixels whose tiles failed to
    /// read come back as zeros and the call then reports
    /// [`ReadFailure`](CacheError::ReadFailure), with the rest of the
    /// buffer intact.
    #[allow(clippy::too_many_arguments)]
    pub fn get_pixels(
        &self,
        filename: &str,
        subimage: usize,
        xbegin: i32,
        xend: i32,
        ybegin: i32,
        yend: i32,
        zbegin: i32,
        zend: i32,
        format: PixelType,
        out: &mut [u8],
    ) -> CacheResult<()> {
        self.with_info(|inner, info| {
            let file = inner.find_file(filename, info);
            let meta = file.meta().map_err(|e| {
                inner.record_error(&e);
                e
            })?;
            if subimage >= meta.subimages.len() {
                let err = CacheError::BadArg(format!(
                    "no subimage {subimage} in \"{filename}\""
                ));
                inner.record_error(&err);
                return Err(err);
            }
            let result = inner.get_pixels_of_file(
                &file, info, subimage, xbegin, xend, ybegin, yend, zbegin, zend, format, out,
            );
            if let Err(err @ CacheError::BadArg(_)) = &result {
                inner.record_error(err);
            }
            result
        })
    }

    /// Resolves and pins one tile, identified by any pixel coordinate
    /// inside it (snapped to the tile lattice). Bypasses the per-thread
    /// micro-cache. Returns `None` for broken files, bad subimages, or
    /// failed reads.
    pub fn get_tile(
        &self,
        filename: &str,
        subimage: usize,
        x: i32,
        y: i32,
        z: i32,
    ) -> Option<TileHandle> {
        self.with_info(|inner, info| {
            let file = inner.find_file(filename, info);
            let meta = file.meta().ok()?;
            let spec = meta.subimages.get(subimage)?;
            let tw = spec.tile_width as i32;
            let th = spec.tile_height as i32;
            let td = spec.tile_depth.max(1) as i32;
            let tx = spec.x + (x - spec.x) / tw * tw;
            let ty = spec.y + (y - spec.y) / th * th;
            let tz = spec.z + (z - spec.z) / td * td;
            let id = TileId::new(file.clone(), subimage, tx, ty, tz);
            let tile = inner.find_tile_main(&id, info);
            if tile.valid() {
                tile.mark_used();
                Some(TileHandle { tile })
            } else {
                None
            }
        })
    }

    /// Unpins a tile obtained from [`get_tile`](Self::get_tile).
    /// Equivalent to dropping the handle.
    pub fn release_tile(&self, handle: TileHandle) {
        handle.tile.mark_used();
        drop(handle);
    }

    /// The raw pixel buffer of a pinned tile and its element type.
    pub fn tile_pixels<'a>(&self, handle: &'a TileHandle) -> (&'a [u8], PixelType) {
        (handle.pixels(), handle.pixel_type())
    }

    /// Invalidates one file: drops all of its cached tiles, closes and
    /// resets it so the next query reloads from disk, and clears every
    /// thread's micro-cache.
    pub fn invalidate(&self, filename: &str) {
        self.with_info(|inner, info| {
            let Some(file) = ({
                let files = inner.files.read().unwrap();
                files.map.get(filename).cloned()
            }) else {
                return;
            };
            {
                let mut tiles = inner.tiles.write().unwrap();
                tiles.map.retain(|id, _| !Arc::ptr_eq(id.file(), &file));
            }
            {
                let _files = inner.files.write().unwrap();
                file.invalidate(inner, info.stats());
            }
            inner.purge_perthread_caches();
        })
    }

    /// Invalidates every file whose on-disk modification time no longer
    /// matches (every file when `force`), and clears the fingerprint
    /// table so deduplication decisions are remade.
    pub fn invalidate_all(&self, force: bool) {
        self.with_info(|inner, info| {
            let snapshot: Vec<Arc<CachedFile>> = {
                let files = inner.files.read().unwrap();
                files.map.values().cloned().collect()
            };
            for file in snapshot {
                let stale = force || file.broken() || {
                    let now = std::fs::metadata(file.path())
                        .ok()
                        .and_then(|m| m.modified().ok());
                    now != file.mod_time()
                };
                if !stale {
                    continue;
                }
                {
                    let mut tiles = inner.tiles.write().unwrap();
                    tiles.map.retain(|id, _| !Arc::ptr_eq(id.file(), &file));
                }
                {
                    let _files = inner.files.write().unwrap();
                    file.invalidate(inner, info.stats());
                }
            }
            {
                let mut files = inner.files.write().unwrap();
                files.fingerprints.clear();
            }
            inner.purge_perthread_caches();
        })
    }

    /// Returns and clears the calling thread's accumulated error
    /// messages, newline-joined, or `None` if there were none.
    pub fn geterror(&self) -> Option<String> {
        perthread::take_error(self.inner.id)
    }

    /// Merged statistics across every thread that has used this cache.
    pub fn stats(&self) -> CacheStats {
        self.inner.merged_stats()
    }

    /// The human-readable statistics report at the given verbosity.
    pub fn getstats(&self, level: i32) -> String {
        self.inner.report(level)
    }

    /// Bytes of tile pixel data currently resident.
    pub fn mem_used(&self) -> usize {
        self.inner.mem_used.load(Ordering::Relaxed)
    }

    /// Number of tiles currently resident.
    pub fn tile_count(&self) -> usize {
        self.inner.tiles.read().unwrap().map.len()
    }

    /// Total tiles ever created by this cache.
    pub fn tiles_created(&self) -> u64 {
        self.inner.tiles_created.load(Ordering::Relaxed)
    }

    /// Number of files currently holding an open reader.
    pub fn open_files(&self) -> usize {
        self.inner.open_files.load(Ordering::Relaxed)
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_roundtrip() {
        let cache = ImageCache::new();
        assert!(cache.attribute("max_open_files", 42));
        assert_eq!(
            cache.get_attribute("max_open_files"),
            Some(AttrValue::Int(42))
        );

        assert!(cache.attribute("max_memory_MB", 1.5f32));
        assert_eq!(
            cache.get_attribute("max_memory_MB"),
            Some(AttrValue::Float(1.5))
        );
        assert!(cache.attribute("max_memory_MB", 2));
        assert_eq!(
            cache.get_attribute("max_memory_MB"),
            Some(AttrValue::Float(2.0))
        );

        assert!(!cache.attribute("no_such_option", 1));
        assert!(cache.get_attribute("no_such_option").is_none());
    }

    #[test]
    fn autotile_rounds_to_power_of_two() {
        let cache = ImageCache::new();
        assert!(cache.attribute("autotile", 48));
        assert_eq!(cache.get_attribute("autotile"), Some(AttrValue::Int(64)));
        assert!(cache.attribute("autotile", 0));
        assert_eq!(cache.get_attribute("autotile"), Some(AttrValue::Int(0)));
    }

    #[test]
    fn searchpath_splits_on_both_separators() {
        let cache = ImageCache::new();
        assert!(cache.attribute("searchpath", "/a/b:/c/d;/e"));
        let c = cache.inner.config();
        assert_eq!(
            c.searchdirs,
            vec![
                PathBuf::from("/a/b"),
                PathBuf::from("/c/d"),
                PathBuf::from("/e")
            ]
        );
    }

    #[test]
    fn matrices_are_read_only() {
        let cache = ImageCache::new();
        assert!(!cache.attribute("worldtocommon", crate::texture::MAT4_IDENTITY));
        assert_eq!(
            cache.get_attribute("worldtocommon"),
            Some(AttrValue::Matrix(crate::texture::MAT4_IDENTITY))
        );
    }

    #[test]
    fn shared_cache_is_a_singleton() {
        let a = ImageCache::create(true);
        let b = ImageCache::create(true);
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        assert!(a.is_shared());
        // Destroying one shared handle leaves the other usable.
        ImageCache::destroy(a);
        assert_eq!(b.mem_used(), 0);

        let private = ImageCache::create(false);
        assert!(!Arc::ptr_eq(&b.inner, &private.inner));
        assert!(!private.is_shared());
    }

    #[test]
    fn geterror_starts_empty_and_clears() {
        let cache = ImageCache::new();
        assert!(cache.geterror().is_none());
        cache.inner.record_error(&CacheError::BadArg("one".into()));
        cache.inner.record_error(&CacheError::BadArg("two".into()));
        assert_eq!(cache.geterror().as_deref(), Some("one\ntwo"));
        assert!(cache.geterror().is_none());
    }
}
