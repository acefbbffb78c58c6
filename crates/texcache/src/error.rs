//! Error types for cache operations.

use thiserror::Error;

/// Errors surfaced by cache queries.
///
/// Errors are also appended to a per-thread message buffer retrievable
/// with [`ImageCache::geterror`](crate::ImageCache::geterror); they never
/// propagate as panics through the cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Search-path resolution failed to locate the file.
    #[error("image file \"{filename}\" not found")]
    FileNotFound {
        /// The filename as the caller gave it.
        filename: String,
    },

    /// The reader rejected the file. Sticky: the file stays broken until
    /// invalidated.
    #[error("could not open \"{filename}\": {reason}")]
    OpenFailure {
        /// The filename as the caller gave it.
        filename: String,
        /// Why the open failed.
        reason: String,
    },

    /// Subimages have heterogeneous channel counts, which the cache does
    /// not support. Sticky.
    #[error("\"{filename}\" has subimages with differing channel counts")]
    BadSubimage {
        /// The filename as the caller gave it.
        filename: String,
    },

    /// The file is untiled and the cache is configured to reject untiled
    /// files. Sticky.
    #[error("\"{filename}\" is untiled, rejecting")]
    RejectUntiled {
        /// The filename as the caller gave it.
        filename: String,
    },

    /// A tile or scanline read failed; the affected tile reads back as
    /// zeros.
    #[error("read failed on \"{filename}\": {reason}")]
    ReadFailure {
        /// The filename as the caller gave it.
        filename: String,
        /// Why the read failed.
        reason: String,
    },

    /// A query argument was invalid (bad subimage index, unknown data
    /// name, undersized buffer, unsupported request).
    #[error("{0}")]
    BadArg(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_filename() {
        let e = CacheError::FileNotFound {
            filename: "missing.exr".into(),
        };
        assert!(e.to_string().contains("missing.exr"));

        let e = CacheError::OpenFailure {
            filename: "bad.tx".into(),
            reason: "truncated header".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("bad.tx"));
        assert!(msg.contains("truncated header"));
    }
}
