//! Per-thread cache state.
//!
//! Each (cache instance, thread) pair owns a record holding the two-entry
//! tile micro-cache and an error buffer. A shared block inside the record
//! is also registered with the cache so that invalidation can raise the
//! `purge` flag from any thread and statistics can be merged on read-out;
//! the micro-cache itself is touched only by the owning thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::stats::ThreadStats;
use crate::tile::CachedTile;

/// State reachable from other threads: the purge flag and statistics.
/// Owned jointly by the thread-local record and the cache's registry.
#[derive(Debug, Default)]
pub(crate) struct ThreadShared {
    pub purge: AtomicBool,
    pub stats: ThreadStats,
}

/// Thread-local record for one cache instance.
pub(crate) struct PerThreadInfo {
    /// Most recently resolved tile.
    pub tile: Option<Arc<CachedTile>>,
    /// The tile resolved before that.
    pub lasttile: Option<Arc<CachedTile>>,
    /// Block shared with the cache's thread registry.
    pub shared: Arc<ThreadShared>,
}

impl PerThreadInfo {
    /// This thread's statistics counters.
    #[inline]
    pub fn stats(&self) -> &ThreadStats {
        &self.shared.stats
    }
}

thread_local! {
    static RECORDS: RefCell<HashMap<u64, PerThreadInfo>> = RefCell::new(HashMap::new());
    static ERRORS: RefCell<HashMap<u64, String>> = RefCell::new(HashMap::new());
}

/// Runs `f` with the calling thread's record for cache `cache_id`,
/// creating and registering it on first use. A pending purge request is
/// honored before `f` runs: the micro-cache is cleared by its owner.
pub(crate) fn with_info<R>(
    cache_id: u64,
    registry: &Mutex<Vec<Arc<ThreadShared>>>,
    f: impl FnOnce(&mut PerThreadInfo) -> R,
) -> R {
    RECORDS.with(|records| {
        let mut map = records.borrow_mut();
        let info = map.entry(cache_id).or_insert_with(|| {
            let shared = Arc::new(ThreadShared::default());
            registry.lock().unwrap().push(shared.clone());
            PerThreadInfo {
                tile: None,
                lasttile: None,
                shared,
            }
        });
        if info.shared.purge.swap(false, Ordering::AcqRel) {
            info.tile = None;
            info.lasttile = None;
        }
        f(info)
    })
}

/// Appends a message to the calling thread's error buffer for `cache_id`,
/// newline-joined with any earlier messages.
pub(crate) fn append_error(cache_id: u64, message: &str) {
    ERRORS.with(|errors| {
        let mut map = errors.borrow_mut();
        let buf = map.entry(cache_id).or_default();
        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(message);
    });
}

/// Takes and clears the calling thread's error buffer for `cache_id`.
pub(crate) fn take_error(cache_id: u64) -> Option<String> {
    ERRORS.with(|errors| {
        let mut map = errors.borrow_mut();
        match map.remove(&cache_id) {
            Some(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_join_with_newlines() {
        append_error(u64::MAX, "first failure");
        append_error(u64::MAX, "second failure");
        let msg = take_error(u64::MAX).unwrap();
        assert_eq!(msg, "first failure\nsecond failure");
        assert!(take_error(u64::MAX).is_none());
    }

    #[test]
    fn record_registered_once() {
        let registry = Mutex::new(Vec::new());
        let id = u64::MAX - 1;
        with_info(id, &registry, |_| {});
        with_info(id, &registry, |_| {});
        assert_eq!(registry.lock().unwrap().len(), 1);
    }

    #[test]
    fn purge_clears_microcache_flag() {
        let registry = Mutex::new(Vec::new());
        let id = u64::MAX - 2;
        with_info(id, &registry, |info| {
            info.shared.purge.store(true, Ordering::Release);
        });
        // Next entry observes the flag, clears it, and resets the
        // (already empty) micro-cache.
        with_info(id, &registry, |info| {
            assert!(!info.shared.purge.load(Ordering::Acquire));
            assert!(info.tile.is_none());
        });
    }
}
