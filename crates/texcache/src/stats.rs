//! Cache statistics.
//!
//! Counters are kept per thread and written lock-free by the owning
//! thread; [`CacheStats`] is the merged read-out. The human-readable
//! report lives on the facade, which has access to the file table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-thread counters. Only the owning thread writes; merging reads
/// with relaxed ordering are exact because S6-style read-outs happen
/// after the worker threads join.
#[derive(Debug, Default)]
pub(crate) struct ThreadStats {
    pub find_tile_calls: AtomicU64,
    pub find_tile_microcache_misses: AtomicU64,
    pub find_tile_cache_misses: AtomicU64,
    pub bytes_read: AtomicU64,
    pub files_totalsize: AtomicU64,
    pub unique_files: AtomicU64,
    pub file_io_time_ns: AtomicU64,
    pub file_open_time_ns: AtomicU64,
}

impl ThreadStats {
    #[inline]
    pub fn incr(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_time(counter: &AtomicU64, dt: Duration) {
        counter.fetch_add(dt.as_nanos() as u64, Ordering::Relaxed);
    }
}

/// Merged statistics across all threads that have used a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total `find_tile` invocations.
    pub find_tile_calls: u64,
    /// Lookups that missed the thread-local micro-cache.
    pub find_tile_microcache_misses: u64,
    /// Lookups that also missed the main tile table and went to disk.
    pub find_tile_cache_misses: u64,
    /// Bytes read from readers.
    pub bytes_read: u64,
    /// Sum of the uncompressed size of every unique image referenced.
    pub files_totalsize: u64,
    /// Number of unique (non-duplicate) files opened.
    pub unique_files: u64,
    /// Accumulated reader I/O time in nanoseconds.
    pub file_io_time_ns: u64,
    /// Accumulated open time in nanoseconds (subset of I/O time).
    pub file_open_time_ns: u64,
}

impl CacheStats {
    /// Folds one thread's counters into this total.
    pub(crate) fn merge(&mut self, t: &ThreadStats) {
        self.find_tile_calls += t.find_tile_calls.load(Ordering::Relaxed);
        self.find_tile_microcache_misses +=
            t.find_tile_microcache_misses.load(Ordering::Relaxed);
        self.find_tile_cache_misses += t.find_tile_cache_misses.load(Ordering::Relaxed);
        self.bytes_read += t.bytes_read.load(Ordering::Relaxed);
        self.files_totalsize += t.files_totalsize.load(Ordering::Relaxed);
        self.unique_files += t.unique_files.load(Ordering::Relaxed);
        self.file_io_time_ns += t.file_io_time_ns.load(Ordering::Relaxed);
        self.file_open_time_ns += t.file_open_time_ns.load(Ordering::Relaxed);
    }

    /// Accumulated reader I/O time.
    pub fn file_io_time(&self) -> Duration {
        Duration::from_nanos(self.file_io_time_ns)
    }
}

/// Formats a byte count with a binary-scaled unit.
pub(crate) fn memformat(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.1} GB", b / GB)
    } else if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a duration as seconds with centisecond precision.
pub(crate) fn timeformat(dt: Duration) -> String {
    format!("{:.2}s", dt.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_counters() {
        let a = ThreadStats::default();
        let b = ThreadStats::default();
        ThreadStats::incr(&a.find_tile_calls, 10);
        ThreadStats::incr(&a.bytes_read, 4096);
        ThreadStats::incr(&b.find_tile_calls, 5);
        ThreadStats::incr(&b.unique_files, 1);

        let mut total = CacheStats::default();
        total.merge(&a);
        total.merge(&b);
        assert_eq!(total.find_tile_calls, 15);
        assert_eq!(total.bytes_read, 4096);
        assert_eq!(total.unique_files, 1);
    }

    #[test]
    fn memformat_units() {
        assert_eq!(memformat(512), "512 B");
        assert_eq!(memformat(2048), "2.0 KB");
        assert_eq!(memformat(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(memformat(5 * 1024 * 1024 * 1024), "5.0 GB");
    }

    #[test]
    fn time_accumulation() {
        let t = ThreadStats::default();
        ThreadStats::add_time(&t.file_io_time_ns, Duration::from_millis(250));
        ThreadStats::add_time(&t.file_io_time_ns, Duration::from_millis(750));
        let mut total = CacheStats::default();
        total.merge(&t);
        assert_eq!(total.file_io_time(), Duration::from_secs(1));
    }
}
