//! The in-memory record for one fixed-size region of the logical file.
//!
//! A chunk owns two buffers: the plaintext the pager sees and the
//! compressed frame that goes to disk.  Its lifecycle:
//!
//! ```text
//!           write                 compress              write+discard
//!   Empty ───────▶ Uncompressed ───────▶ Unwritten ───────▶ Cached
//!     ▲                  ▲                                    │
//!     │                  └────────────── write ◀──────────────┘
//!     └── load found a hole / slot reused
//! ```
//!
//! `Cached` means the in-memory copies match the disk exactly: the region
//! holds `comp_len` frame bytes followed by a hole.  `Empty` means the
//! region has never been written; on disk it reads back as zeros.

use flate2::Compression;

use crate::codec;
use crate::sparse::SparseFile;
use crate::trace::{vtrace, TraceLevel};
use crate::vfs::{VfsError, VfsFile, VfsResult};

/// Lifecycle state of a chunk slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// No data observed for this region.
    Empty,
    /// Plaintext mutated since the last flush; the compressed buffer is
    /// stale.
    Uncompressed,
    /// Recompressed but not yet written out.
    Unwritten,
    /// In-memory copies match the on-disk region.
    Cached,
}

/// One chunk slot: buffers, lengths, and lifecycle state.
#[derive(Debug)]
pub struct Chunk {
    /// Start of the region in the logical file; always a multiple of the
    /// chunk size.
    logical_offset: u64,
    /// Valid plaintext bytes, `<=` chunk size at all times.
    plaintext_len: usize,
    /// Length of the compressed frame, meaningful in Unwritten and Cached.
    comp_len: usize,
    /// Whether the region reached past the physical end of file when it
    /// was last loaded.  Reads of such a region honour the host's
    /// short-read convention.
    beyond_eof: bool,
    state: ChunkState,
    plain: Box<[u8]>,
    comp: Box<[u8]>,
}

impl Chunk {
    /// Allocates an empty slot for regions of `chunk_size` bytes.
    pub fn new(chunk_size: usize) -> Chunk {
        Chunk {
            logical_offset: 0,
            plaintext_len: 0,
            comp_len: 0,
            beyond_eof: false,
            state: ChunkState::Empty,
            plain: vec![0u8; chunk_size].into_boxed_slice(),
            comp: vec![0u8; codec::compress_bound(chunk_size)].into_boxed_slice(),
        }
    }

    /// Width of the region this slot serves.
    pub fn chunk_size(&self) -> usize {
        self.plain.len()
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn logical_offset(&self) -> u64 {
        self.logical_offset
    }

    pub fn plaintext_len(&self) -> usize {
        self.plaintext_len
    }

    /// The decompressed view of the region.  Bytes past `plaintext_len`
    /// are zero.
    pub fn plaintext(&self) -> &[u8] {
        &self.plain
    }

    /// Whether this slot is an empty region that reached past the physical
    /// end of the file at load time.
    pub fn is_hole_beyond_eof(&self) -> bool {
        self.state == ChunkState::Empty && self.beyond_eof
    }

    /// Copies `data` into the plaintext at `offset_in_chunk` and marks the
    /// chunk dirty.  Panics on overrun: the dispatcher never produces a
    /// segment that crosses the region edge, so an overrun is a programmer
    /// error, not an I/O condition.
    pub fn write_segment(&mut self, offset_in_chunk: usize, data: &[u8]) {
        let end = offset_in_chunk + data.len();
        assert!(
            end <= self.plain.len(),
            "chunk overrun: {} > {} at region {}",
            end,
            self.plain.len(),
            self.logical_offset
        );
        self.plain[offset_in_chunk..end].copy_from_slice(data);
        self.plaintext_len = self.plaintext_len.max(end);
        self.state = ChunkState::Uncompressed;
    }

    /// Writes the chunk out if it is dirty: recompress when the plaintext
    /// changed, store exactly `comp_len` frame bytes at the region start,
    /// then discard the tail of the region.  Empty and Cached chunks are
    /// left alone.
    ///
    /// On failure the chunk keeps its pre-flush state so the caller may
    /// retry or surface the error.
    pub fn flush(
        &mut self,
        real: &mut dyn VfsFile,
        sparse: &SparseFile,
        level: Compression,
    ) -> VfsResult<()> {
        if self.plaintext_len == 0
            || matches!(self.state, ChunkState::Empty | ChunkState::Cached)
        {
            vtrace!(
                TraceLevel::Trace,
                "> skipped flush(ofst={}, state={:?})",
                self.logical_offset,
                self.state
            );
            return Ok(());
        }

        let chunk_size = self.plain.len();
        if self.state == ChunkState::Uncompressed {
            let n = codec::compress(&self.plain[..self.plaintext_len], &mut self.comp, level)?;
            if n > chunk_size {
                // The frame must fit its region: the region width is the
                // addressing unit of the on-disk format.
                return Err(VfsError::Codec("compressed frame exceeds chunk region"));
            }
            self.comp_len = n;
            self.state = ChunkState::Unwritten;
            vtrace!(
                TraceLevel::Compression,
                "> compressed {} into {} bytes at ofst={}",
                self.plaintext_len,
                self.comp_len,
                self.logical_offset
            );
        }

        real.write(&self.comp[..self.comp_len], self.logical_offset)?;
        sparse
            .discard(
                self.logical_offset + self.comp_len as u64,
                (chunk_size - self.comp_len) as u64,
            )
            .map_err(VfsError::Io)?;
        self.state = ChunkState::Cached;
        Ok(())
    }

    /// Loads the region starting at `offset` from disk into this slot,
    /// replacing whatever it held.
    ///
    /// A short read is not an error here: the tail of the buffer arrives
    /// zero-filled per the host contract, and the shortfall only means the
    /// region reaches past the physical end of file.  A first byte of zero
    /// is the hole sentinel — the region was never written and the slot
    /// becomes Empty.  Anything else is a frame and is inflated.  On any
    /// hard error the slot is left Empty.
    pub fn load(&mut self, real: &mut dyn VfsFile, offset: u64) -> VfsResult<()> {
        let chunk_size = self.plain.len();
        self.state = ChunkState::Empty;
        self.plaintext_len = 0;
        self.comp_len = 0;
        self.logical_offset = offset;

        self.beyond_eof = match real.read(&mut self.comp[..chunk_size], offset) {
            Ok(()) => false,
            Err(VfsError::ShortRead) => true,
            Err(e) => return Err(e),
        };

        if self.comp[0] == 0 {
            // Hole sentinel: a frame always starts with a nonzero byte.
            self.plain.fill(0);
            vtrace!(
                TraceLevel::Trace,
                "> loaded hole at ofst={} (beyond_eof={})",
                offset,
                self.beyond_eof
            );
            return Ok(());
        }

        let (plain_len, frame_len) = codec::decompress(&self.comp[..chunk_size], &mut self.plain)?;
        self.plaintext_len = plain_len;
        self.comp_len = frame_len;
        self.plain[plain_len..].fill(0);
        self.beyond_eof = false;
        self.state = ChunkState::Cached;
        vtrace!(
            TraceLevel::Compression,
            "> decompressed {} bytes from ofst={}",
            plain_len,
            offset
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::os::OsVfs;
    use crate::vfs::{OpenFlags, Vfs};

    fn fixture() -> (tempfile::TempDir, Box<dyn VfsFile>, SparseFile) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chunks.db");
        let file = OsVfs::new()
            .open(Some(&path), OpenFlags::main_db())
            .expect("open");
        let sparse = SparseFile::open(&path).expect("sparse open");
        (dir, file, sparse)
    }

    #[test]
    fn write_segment_tracks_extent_and_state() {
        let mut c = Chunk::new(1024);
        assert_eq!(c.state(), ChunkState::Empty);
        c.write_segment(100, &[7u8; 50]);
        assert_eq!(c.state(), ChunkState::Uncompressed);
        assert_eq!(c.plaintext_len(), 150);
        c.write_segment(0, &[9u8; 10]);
        // A write below the high-water mark must not shrink the extent.
        assert_eq!(c.plaintext_len(), 150);
    }

    #[test]
    #[should_panic(expected = "chunk overrun")]
    fn overrun_panics() {
        let mut c = Chunk::new(64);
        c.write_segment(60, &[0u8; 8]);
    }

    #[test]
    fn flush_then_load_roundtrips() {
        let (_dir, mut file, sparse) = fixture();
        let level = Compression::new(6);

        let mut c = Chunk::new(4096);
        c.write_segment(0, b"hello chunk");
        c.flush(file.as_mut(), &sparse, level).expect("flush");
        assert_eq!(c.state(), ChunkState::Cached);

        let mut loaded = Chunk::new(4096);
        loaded.load(file.as_mut(), 0).expect("load");
        assert_eq!(loaded.state(), ChunkState::Cached);
        assert_eq!(loaded.plaintext_len(), 11);
        assert_eq!(&loaded.plaintext()[..11], b"hello chunk");
        assert!(loaded.plaintext()[11..].iter().all(|&b| b == 0));
    }

    #[test]
    fn flush_is_idempotent() {
        let (_dir, mut file, sparse) = fixture();
        let level = Compression::new(6);

        let mut c = Chunk::new(4096);
        c.write_segment(0, &[0x42u8; 1000]);
        c.flush(file.as_mut(), &sparse, level).expect("first flush");
        let size_after_first = file.size().expect("size");
        c.flush(file.as_mut(), &sparse, level).expect("second flush");
        assert_eq!(file.size().expect("size"), size_after_first);
        assert_eq!(c.state(), ChunkState::Cached);
    }

    #[test]
    fn load_of_unwritten_region_is_empty_and_short() {
        let (_dir, mut file, _sparse) = fixture();
        let mut c = Chunk::new(4096);
        c.load(file.as_mut(), 0).expect("load");
        assert_eq!(c.state(), ChunkState::Empty);
        assert_eq!(c.plaintext_len(), 0);
        assert!(c.is_hole_beyond_eof());
        assert!(c.plaintext().iter().all(|&b| b == 0));
    }

    #[test]
    fn load_zeroes_stale_plaintext() {
        let (_dir, mut file, _sparse) = fixture();
        let mut c = Chunk::new(4096);
        c.write_segment(0, &[0xFFu8; 4096]);
        // Reuse the dirty slot for a region that turns out to be a hole:
        // nothing of the previous tenant may survive.
        c.load(file.as_mut(), 0).expect("load");
        assert!(c.plaintext().iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_flush_writes_nothing() {
        let (_dir, mut file, sparse) = fixture();
        let mut c = Chunk::new(4096);
        c.flush(file.as_mut(), &sparse, Compression::new(6))
            .expect("flush");
        assert_eq!(file.size().expect("size"), 0);
    }
}
