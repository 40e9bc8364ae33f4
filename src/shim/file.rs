//! The pager-facing compressed file.
//!
//! Owns the underlying VFS file, the sparse maintenance handle, and the
//! chunk cache, and splits every read and write at chunk boundaries.  All
//! mutation happens in the cache; the disk only changes on flush — at sync,
//! at eviction, on the sync-omitted hint, and at close.
//!
//! The pager's view is bit-exact: every byte it writes comes back
//! identically, whatever the compression did underneath.

use crate::cache::ChunkCache;
use crate::options::Options;
use crate::sparse::SparseFile;
use crate::stats;
use crate::trace::{vtrace, TraceLevel};
use crate::vfs::{
    FileControlOp, LockLevel, SyncFlags, VfsError, VfsFile, VfsResult,
};

/// A main database file routed through the compression pipeline.
///
/// Operations are synchronous and caller-driven; there are no internal
/// threads.  A single open file must not be used from multiple threads
/// concurrently — the host pager serialises its own access per connection,
/// and this type relies on that serialisation rather than carrying a lock
/// of its own.
pub struct CompressedFile {
    real: Box<dyn VfsFile>,
    /// Present until close; the handle is released exactly once.
    sparse: Option<SparseFile>,
    cache: ChunkCache,
    chunk_size: usize,
    level: flate2::Compression,
    /// Base name, for trace output only.
    name: String,
}

impl CompressedFile {
    pub(crate) fn new(
        real: Box<dyn VfsFile>,
        sparse: SparseFile,
        options: &Options,
        name: String,
    ) -> CompressedFile {
        CompressedFile {
            real,
            sparse: Some(sparse),
            cache: ChunkCache::new(options.cache_chunks, options.chunk_size),
            chunk_size: options.chunk_size,
            level: options.compression,
            name,
        }
    }

    fn flush_all(&mut self) -> VfsResult<()> {
        let sparse = self
            .sparse
            .as_ref()
            .ok_or(VfsError::Misuse("file used after close"))?;
        self.cache.flush_all(self.real.as_mut(), sparse, self.level)
    }
}

impl VfsFile for CompressedFile {
    /// Reads through the chunk cache, one region segment at a time.
    ///
    /// Regions that were never written read back as zeros.  When any
    /// covered region reaches past the physical end of file, the host's
    /// short-read convention applies: the buffer is still filled (with
    /// zeros there) and [`VfsError::ShortRead`] is reported.
    fn read(&mut self, buf: &mut [u8], offset: u64) -> VfsResult<()> {
        let chunk_size = self.chunk_size as u64;
        let mut beyond_eof = false;
        let mut pos = 0usize;
        while pos < buf.len() {
            let abs = offset + pos as u64;
            let chunk_offset = abs - abs % chunk_size;
            let in_off = (abs % chunk_size) as usize;
            let seg = (buf.len() - pos).min(self.chunk_size - in_off);

            let sparse = self
                .sparse
                .as_ref()
                .ok_or(VfsError::Misuse("file used after close"))?;
            let chunk = self
                .cache
                .get(self.real.as_mut(), sparse, self.level, chunk_offset)?;
            buf[pos..pos + seg].copy_from_slice(&chunk.plaintext()[in_off..in_off + seg]);
            beyond_eof |= chunk.is_hole_beyond_eof();
            pos += seg;
        }
        vtrace!(
            TraceLevel::Io,
            "> {}.read(n={}, ofst={})",
            self.name,
            buf.len(),
            offset
        );
        if beyond_eof {
            return Err(VfsError::ShortRead);
        }
        Ok(())
    }

    /// Writes into the chunk cache, one region segment at a time.  Nothing
    /// reaches the disk until the next flush point.
    fn write(&mut self, buf: &[u8], offset: u64) -> VfsResult<()> {
        let chunk_size = self.chunk_size as u64;
        let mut pos = 0usize;
        while pos < buf.len() {
            let abs = offset + pos as u64;
            let chunk_offset = abs - abs % chunk_size;
            let in_off = (abs % chunk_size) as usize;
            let seg = (buf.len() - pos).min(self.chunk_size - in_off);

            let sparse = self
                .sparse
                .as_ref()
                .ok_or(VfsError::Misuse("file used after close"))?;
            let chunk = self
                .cache
                .get(self.real.as_mut(), sparse, self.level, chunk_offset)?;
            chunk.write_segment(in_off, &buf[pos..pos + seg]);
            pos += seg;
        }
        vtrace!(
            TraceLevel::Io,
            "> {}.write(n={}, ofst={})",
            self.name,
            buf.len(),
            offset
        );
        Ok(())
    }

    /// Forwards to the underlying file.  Cached chunks above the new size
    /// are deliberately not invalidated: the pager only truncates at
    /// region-aligned sizes on a quiescent file, and a shrink-then-read
    /// above the new size is outside its discipline.
    fn truncate(&mut self, size: u64) -> VfsResult<()> {
        vtrace!(TraceLevel::NonIo, "{}.truncate({})", self.name, size);
        self.real.truncate(size)
    }

    /// The only guarantee point: every dirty chunk reaches the disk, then
    /// the underlying file syncs.
    fn sync(&mut self, flags: SyncFlags) -> VfsResult<()> {
        vtrace!(TraceLevel::NonIo, "{}.sync(full={})", self.name, flags.full);
        self.flush_all()?;
        self.real.sync(flags)
    }

    /// Physical size of the wrapper file — not the logical decompressed
    /// size.  The pager interprets it through its own header.
    fn size(&mut self) -> VfsResult<u64> {
        self.real.size()
    }

    fn lock(&mut self, level: LockLevel) -> VfsResult<()> {
        vtrace!(TraceLevel::NonIo, "{}.lock({:?})", self.name, level);
        self.real.lock(level)
    }

    fn unlock(&mut self, level: LockLevel) -> VfsResult<()> {
        vtrace!(TraceLevel::NonIo, "{}.unlock({:?})", self.name, level);
        self.real.unlock(level)
    }

    fn check_reserved_lock(&mut self) -> VfsResult<bool> {
        self.real.check_reserved_lock()
    }

    /// Forwards, after honouring the sync-omitted hint: the host is telling
    /// us it will not sync, so buffered chunks must reach the file now.
    fn file_control(&mut self, op: FileControlOp) -> VfsResult<()> {
        vtrace!(TraceLevel::NonIo, "{}.file_control({:?})", self.name, op);
        if op == FileControlOp::SyncOmitted {
            self.flush_all()?;
        }
        self.real.file_control(op)
    }

    fn sector_size(&mut self) -> usize {
        self.real.sector_size()
    }

    fn device_characteristics(&mut self) -> u32 {
        self.real.device_characteristics()
    }

    fn shm_map(&mut self, region: usize, region_size: usize, extend: bool) -> VfsResult<&mut [u8]> {
        self.real.shm_map(region, region_size, extend)
    }

    fn shm_lock(&mut self, offset: usize, n: usize, flags: u32) -> VfsResult<()> {
        self.real.shm_lock(offset, n, flags)
    }

    fn shm_barrier(&mut self) {
        self.real.shm_barrier()
    }

    fn shm_unmap(&mut self, delete: bool) -> VfsResult<()> {
        self.real.shm_unmap(delete)
    }

    fn close(&mut self) -> VfsResult<()> {
        self.flush_all()?;
        if crate::trace::enabled(TraceLevel::Registration) {
            let s = stats::snapshot();
            vtrace!(
                TraceLevel::Registration,
                "{}: cache hits: {}, misses: {}, total: {}, ratio: {:.2}%",
                self.name,
                s.cache_hits,
                s.cache_lookups - s.cache_hits,
                s.cache_lookups,
                s.hit_ratio()
            );
            vtrace!(
                TraceLevel::Registration,
                "{}: compressed: {} chunks, decompressed: {} chunks",
                self.name,
                s.chunks_compressed,
                s.chunks_decompressed
            );
        }
        vtrace!(TraceLevel::OpenClose, "{}.close()", self.name);
        self.sparse = None;
        self.real.close()
    }
}
