//! Process-wide cache and codec counters.
//!
//! Updated from the hot paths with relaxed atomics and reported at
//! [`TraceLevel::Registration`](crate::trace::TraceLevel) when a compressed
//! file closes.  The counters are cumulative over the process lifetime and
//! span all open files.

use std::sync::atomic::{AtomicU64, Ordering};

static CACHE_LOOKUPS: AtomicU64 = AtomicU64::new(0);
static CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static CHUNKS_COMPRESSED: AtomicU64 = AtomicU64::new(0);
static CHUNKS_DECOMPRESSED: AtomicU64 = AtomicU64::new(0);

#[inline]
pub(crate) fn record_lookup() {
    CACHE_LOOKUPS.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_hit() {
    CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_compress() {
    CHUNKS_COMPRESSED.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_decompress() {
    CHUNKS_DECOMPRESSED.fetch_add(1, Ordering::Relaxed);
}

/// A point-in-time copy of the process-wide counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Chunk-cache lookups (hits + misses).
    pub cache_lookups: u64,
    /// Chunk-cache hits.
    pub cache_hits: u64,
    /// Chunks handed to the compressor.
    pub chunks_compressed: u64,
    /// Chunks handed to the decompressor.
    pub chunks_decompressed: u64,
}

impl Snapshot {
    /// Cache hit ratio in percent, or 0.0 before the first lookup.
    pub fn hit_ratio(&self) -> f64 {
        if self.cache_lookups == 0 {
            0.0
        } else {
            100.0 * self.cache_hits as f64 / self.cache_lookups as f64
        }
    }
}

/// Reads the current counter values.
pub fn snapshot() -> Snapshot {
    Snapshot {
        cache_lookups: CACHE_LOOKUPS.load(Ordering::Relaxed),
        cache_hits: CACHE_HITS.load(Ordering::Relaxed),
        chunks_compressed: CHUNKS_COMPRESSED.load(Ordering::Relaxed),
        chunks_decompressed: CHUNKS_DECOMPRESSED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotonic() {
        let before = snapshot();
        record_lookup();
        record_hit();
        record_compress();
        record_decompress();
        let after = snapshot();
        assert!(after.cache_lookups > before.cache_lookups);
        assert!(after.cache_hits > before.cache_hits);
        assert!(after.chunks_compressed > before.chunks_compressed);
        assert!(after.chunks_decompressed > before.chunks_decompressed);
    }

    #[test]
    fn hit_ratio_handles_zero_lookups() {
        let s = Snapshot::default();
        assert_eq!(s.hit_ratio(), 0.0);
        let s = Snapshot {
            cache_lookups: 4,
            cache_hits: 3,
            ..Snapshot::default()
        };
        assert!((s.hit_ratio() - 75.0).abs() < 1e-9);
    }
}
