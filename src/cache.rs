//! The per-file chunk cache.
//!
//! A small, fixed array of chunk slots ordered by recency: the head is the
//! most recently used, the tail is the eviction victim.  Recency is
//! maintained with a partial move-to-front — one swap toward the head per
//! access — which approximates LRU for the slot counts used here while
//! keeping sequential scans from evicting the working set wholesale.

use flate2::Compression;

use crate::chunk::{Chunk, ChunkState};
use crate::sparse::SparseFile;
use crate::stats;
use crate::vfs::{VfsFile, VfsResult};

/// Fixed-capacity chunk cache for one open file.
#[derive(Debug)]
pub struct ChunkCache {
    slots: Vec<Chunk>,
}

impl ChunkCache {
    /// Allocates `n` slots (at least 2) for regions of `chunk_size` bytes.
    pub fn new(n: usize, chunk_size: usize) -> ChunkCache {
        let n = n.max(2);
        ChunkCache {
            slots: (0..n).map(|_| Chunk::new(chunk_size)).collect(),
        }
    }

    /// Returns the chunk for the region starting at `offset`, loading it
    /// from disk (and flushing an evicted slot first) on a miss.
    ///
    /// `offset` must be region-aligned.  A hit moves the slot one position
    /// toward the head.  On a miss the victim is the first empty slot from
    /// the head, or the tail; a dirty victim is flushed before reuse, and a
    /// flush failure surfaces with the victim untouched.
    pub fn get(
        &mut self,
        real: &mut dyn VfsFile,
        sparse: &SparseFile,
        level: Compression,
        offset: u64,
    ) -> VfsResult<&mut Chunk> {
        debug_assert_eq!(
            offset % self.slots[0].chunk_size() as u64,
            0,
            "chunk offset must be region-aligned"
        );
        stats::record_lookup();

        if let Some(i) = self
            .slots
            .iter()
            .position(|c| c.state() != ChunkState::Empty && c.logical_offset() == offset)
        {
            stats::record_hit();
            let dst = i.saturating_sub(1);
            self.slots.swap(dst, i);
            return Ok(&mut self.slots[dst]);
        }

        let victim = self
            .slots
            .iter()
            .position(|c| c.state() == ChunkState::Empty)
            .unwrap_or(self.slots.len() - 1);
        self.slots[victim].flush(real, sparse, level)?;

        let dst = victim.saturating_sub(1);
        self.slots.swap(dst, victim);
        self.slots[dst].load(real, offset)?;
        Ok(&mut self.slots[dst])
    }

    /// Flushes every dirty slot, stopping at the first error.  Slot order
    /// is irrelevant: regions never overlap.
    pub fn flush_all(
        &mut self,
        real: &mut dyn VfsFile,
        sparse: &SparseFile,
        level: Compression,
    ) -> VfsResult<()> {
        for slot in &mut self.slots {
            slot.flush(real, sparse, level)?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn slot_summary(&self) -> Vec<(u64, ChunkState)> {
        self.slots
            .iter()
            .map(|c| (c.logical_offset(), c.state()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::os::OsVfs;
    use crate::vfs::{OpenFlags, Vfs, VfsFile};

    const CS: usize = 4096;

    fn fixture() -> (tempfile::TempDir, Box<dyn VfsFile>, SparseFile) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.db");
        let file = OsVfs::new()
            .open(Some(&path), OpenFlags::main_db())
            .expect("open");
        let sparse = SparseFile::open(&path).expect("sparse open");
        (dir, file, sparse)
    }

    fn level() -> Compression {
        Compression::new(6)
    }

    fn fill(cache: &mut ChunkCache, file: &mut dyn VfsFile, sparse: &SparseFile, off: u64, byte: u8) {
        let c = cache.get(file, sparse, level(), off).expect("get");
        c.write_segment(0, &[byte; 64]);
    }

    #[test]
    fn capacity_is_at_least_two() {
        let cache = ChunkCache::new(0, CS);
        assert_eq!(cache.slot_summary().len(), 2);
    }

    #[test]
    fn hit_moves_slot_toward_head() {
        let (_dir, mut file, sparse) = fixture();
        let mut cache = ChunkCache::new(3, CS);
        fill(&mut cache, file.as_mut(), &sparse, 0, 0xA1);
        fill(&mut cache, file.as_mut(), &sparse, CS as u64, 0xA2);
        fill(&mut cache, file.as_mut(), &sparse, 2 * CS as u64, 0xA3);

        // Touch the tail chunk; it must move up one position, not to the
        // very front.
        let before = cache.slot_summary();
        let tail_offset = before[2].0;
        cache
            .get(file.as_mut(), &sparse, level(), tail_offset)
            .expect("hit");
        let after = cache.slot_summary();
        assert_eq!(after[1].0, tail_offset);
    }

    #[test]
    fn miss_with_full_cache_evicts_tail_and_flushes_it() {
        let (_dir, mut file, sparse) = fixture();
        let mut cache = ChunkCache::new(2, CS);
        fill(&mut cache, file.as_mut(), &sparse, 0, 0xB1);
        fill(&mut cache, file.as_mut(), &sparse, CS as u64, 0xB2);

        // Both slots dirty; a third region forces the tail out through a
        // flush, which becomes visible on disk.
        cache
            .get(file.as_mut(), &sparse, level(), 2 * CS as u64)
            .expect("miss");
        assert!(file.size().expect("size") > 0);
    }

    #[test]
    fn evicted_chunk_reloads_with_its_data() {
        let (_dir, mut file, sparse) = fixture();
        let mut cache = ChunkCache::new(2, CS);
        fill(&mut cache, file.as_mut(), &sparse, 0, 0xC1);
        fill(&mut cache, file.as_mut(), &sparse, CS as u64, 0xC2);
        fill(&mut cache, file.as_mut(), &sparse, 2 * CS as u64, 0xC3);
        fill(&mut cache, file.as_mut(), &sparse, 3 * CS as u64, 0xC4);

        // The first region was evicted long ago; it must come back intact.
        let c = cache.get(file.as_mut(), &sparse, level(), 0).expect("get");
        assert_eq!(c.state(), ChunkState::Cached);
        assert!(c.plaintext()[..64].iter().all(|&b| b == 0xC1));
    }

    #[test]
    fn flush_all_cleans_every_slot() {
        let (_dir, mut file, sparse) = fixture();
        let mut cache = ChunkCache::new(3, CS);
        fill(&mut cache, file.as_mut(), &sparse, 0, 0xD1);
        fill(&mut cache, file.as_mut(), &sparse, CS as u64, 0xD2);
        cache
            .flush_all(file.as_mut(), &sparse, level())
            .expect("flush_all");
        for (_, state) in cache.slot_summary() {
            assert!(matches!(state, ChunkState::Cached | ChunkState::Empty));
        }
    }

    #[test]
    fn empty_region_lookup_does_not_create_an_entry() {
        let (_dir, mut file, sparse) = fixture();
        let mut cache = ChunkCache::new(2, CS);
        // Write something so the file has a physical extent, then look at a
        // region past it.
        fill(&mut cache, file.as_mut(), &sparse, 0, 0xE1);
        cache
            .flush_all(file.as_mut(), &sparse, level())
            .expect("flush_all");

        let c = cache
            .get(file.as_mut(), &sparse, level(), 4 * CS as u64)
            .expect("get");
        assert_eq!(c.state(), ChunkState::Empty);
        assert!(c.is_hole_beyond_eof());
        // A second lookup of the same hole reloads — empty slots are not
        // entries — and still yields an empty chunk.
        let c = cache
            .get(file.as_mut(), &sparse, level(), 4 * CS as u64)
            .expect("get");
        assert_eq!(c.state(), ChunkState::Empty);
        // The written region survived alongside it.
        let c = cache.get(file.as_mut(), &sparse, level(), 0).expect("get");
        assert!(c.plaintext()[..64].iter().all(|&b| b == 0xE1));
    }
}
