//! The host database's virtual-filesystem contract, rendered as traits.
//!
//! The host consumes files and filesystems through method tables; here each
//! table is an object-safe trait:
//!
//! - [`VfsFile`] — one open file: positioned reads and writes, truncate,
//!   sync, locking, file-control, and the shared-memory hooks.
//! - [`Vfs`] — one filesystem: open, delete, access, path canonicalisation.
//!
//! A shim is simply a [`Vfs`] that owns another [`Vfs`] and forwards what it
//! does not transform.  Errors travel as [`VfsError`]; the host's
//! short-read convention (zero-fill the tail of the buffer, then report
//! [`VfsError::ShortRead`]) is part of the [`VfsFile::read`] contract and is
//! relied upon by the chunk loader.

pub mod os;
pub mod registry;

use std::error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type of the VFS layer.
#[derive(Debug)]
pub enum VfsError {
    /// An underlying read, write, lock, or sync failed.
    Io(io::Error),
    /// A read hit end-of-file before the buffer was full.  Per the host
    /// contract the untouched tail of the buffer has been zero-filled.
    ShortRead,
    /// A named VFS was not found in the registry, or a file-control
    /// operation is not understood by the file it reached.
    NotFound,
    /// Compression or decompression failed; the affected operation is
    /// abandoned.
    Codec(&'static str),
    /// API misuse detected at a recoverable boundary, such as installing
    /// the shim twice.
    Misuse(&'static str),
    /// The operation is not supported by this file (shared memory on files
    /// that have none).
    Unsupported,
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::Io(e) => write!(f, "i/o error: {}", e),
            VfsError::ShortRead => write!(f, "short read"),
            VfsError::NotFound => write!(f, "not found"),
            VfsError::Misuse(msg) => write!(f, "misuse: {}", msg),
            VfsError::Unsupported => write!(f, "operation not supported"),
            VfsError::Codec(msg) => write!(f, "codec failure: {}", msg),
        }
    }
}

impl error::Error for VfsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            VfsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for VfsError {
    fn from(e: io::Error) -> Self {
        VfsError::Io(e)
    }
}

/// Result alias used across the VFS layer.
pub type VfsResult<T> = Result<T, VfsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Open flags
// ─────────────────────────────────────────────────────────────────────────────

/// The role a file plays for the host database.  Only [`FileKind::MainDb`]
/// files are candidates for the compression pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    MainDb,
    MainJournal,
    Wal,
    TempDb,
    TempJournal,
    SubJournal,
    SuperJournal,
    TransientDb,
}

/// Flags accompanying an open request.
#[derive(Clone, Copy, Debug)]
pub struct OpenFlags {
    pub kind: FileKind,
    pub read_only: bool,
    pub create: bool,
    pub exclusive: bool,
    pub delete_on_close: bool,
}

impl OpenFlags {
    /// Flags for a main database file: read-write, created if absent.
    pub fn main_db() -> Self {
        OpenFlags {
            kind: FileKind::MainDb,
            read_only: false,
            create: true,
            exclusive: false,
            delete_on_close: false,
        }
    }

    /// Flags for a rollback journal.
    pub fn main_journal() -> Self {
        OpenFlags {
            kind: FileKind::MainJournal,
            read_only: false,
            create: true,
            exclusive: false,
            delete_on_close: false,
        }
    }

    /// Flags for a transient file, removed when closed.
    pub fn temp_db() -> Self {
        OpenFlags {
            kind: FileKind::TempDb,
            read_only: false,
            create: true,
            exclusive: true,
            delete_on_close: true,
        }
    }
}

/// What [`Vfs::access`] should test for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessCheck {
    Exists,
    ReadWrite,
}

// ─────────────────────────────────────────────────────────────────────────────
// Locking and sync
// ─────────────────────────────────────────────────────────────────────────────

/// The host database's five-level lock ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockLevel {
    None,
    Shared,
    Reserved,
    Pending,
    Exclusive,
}

/// Flags for [`VfsFile::sync`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncFlags {
    /// Full barrier semantics rather than a normal sync.
    pub full: bool,
    /// File data only; metadata may be deferred.
    pub data_only: bool,
}

/// File-control operations.  Unknown operations answer
/// [`VfsError::NotFound`], which callers treat as "not supported here".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileControlOp {
    /// Advisory final size of the file, set before a large write burst.
    SizeHint(i64),
    /// Advisory allocation granularity.
    ChunkSize(i32),
    /// The host elided a sync it would normally issue; anything buffered
    /// must reach the file now.
    SyncOmitted,
    /// Query of the current lock state.
    LockState,
    /// Escape hatch for host-specific operations.
    Other(u32),
}

// ─────────────────────────────────────────────────────────────────────────────
// File and filesystem traits
// ─────────────────────────────────────────────────────────────────────────────

/// One open file, as the host database sees it.
pub trait VfsFile: Send {
    /// Positioned read filling `buf` from `offset`.  When end-of-file is
    /// reached first, the remainder of `buf` is zero-filled and
    /// [`VfsError::ShortRead`] returned.
    fn read(&mut self, buf: &mut [u8], offset: u64) -> VfsResult<()>;

    /// Positioned write of all of `buf` at `offset`, extending the file as
    /// needed.
    fn write(&mut self, buf: &[u8], offset: u64) -> VfsResult<()>;

    /// Truncates or extends the file to exactly `size` bytes.
    fn truncate(&mut self, size: u64) -> VfsResult<()>;

    /// Forces file content (and metadata, unless `data_only`) to stable
    /// storage.
    fn sync(&mut self, flags: SyncFlags) -> VfsResult<()>;

    /// Current size of the file in bytes.
    fn size(&mut self) -> VfsResult<u64>;

    /// Upgrades to `level`.  A no-op when the file already holds `level`
    /// or stronger.
    fn lock(&mut self, level: LockLevel) -> VfsResult<()>;

    /// Downgrades to `level`.  A no-op when the file already holds `level`
    /// or weaker.
    fn unlock(&mut self, level: LockLevel) -> VfsResult<()>;

    /// Whether any handle holds a reserved (or stronger) lock on this file.
    fn check_reserved_lock(&mut self) -> VfsResult<bool>;

    /// Host-specific control operations.
    fn file_control(&mut self, op: FileControlOp) -> VfsResult<()>;

    /// Sector size of the underlying storage.
    fn sector_size(&mut self) -> usize {
        4096
    }

    /// Device-characteristic bits, in the host database's encoding.
    fn device_characteristics(&mut self) -> u32 {
        0
    }

    /// Maps a shared-memory region, growing the mapping when `extend` is
    /// set.
    fn shm_map(&mut self, _region: usize, _region_size: usize, _extend: bool) -> VfsResult<&mut [u8]> {
        Err(VfsError::Unsupported)
    }

    /// Locks a span of shared-memory lock slots; `flags` uses the host
    /// encoding.
    fn shm_lock(&mut self, _offset: usize, _n: usize, _flags: u32) -> VfsResult<()> {
        Err(VfsError::Unsupported)
    }

    /// Memory barrier pairing with `shm_map`.
    fn shm_barrier(&mut self) {}

    /// Unmaps shared memory, deleting the backing store when `delete` is
    /// set.
    fn shm_unmap(&mut self, _delete: bool) -> VfsResult<()> {
        Ok(())
    }

    /// Flushes anything buffered and releases resources.  The file must not
    /// be used afterwards.
    fn close(&mut self) -> VfsResult<()>;
}

/// One filesystem, as the host database sees it.
pub trait Vfs: Send + Sync {
    /// Registry name of this VFS.
    fn name(&self) -> &str;

    /// Opens `path` (or an anonymous temp file when `path` is `None`) with
    /// the given flags.
    fn open(&self, path: Option<&Path>, flags: OpenFlags) -> VfsResult<Box<dyn VfsFile>>;

    /// Deletes the file at `path`, syncing the containing directory when
    /// `sync_dir` is set.
    fn delete(&self, path: &Path, sync_dir: bool) -> VfsResult<()>;

    /// Tests whether `path` satisfies `check`.
    fn access(&self, path: &Path, check: AccessCheck) -> VfsResult<bool>;

    /// Canonicalises `path`.
    fn full_pathname(&self, path: &Path) -> VfsResult<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn lock_levels_are_ordered() {
        assert!(LockLevel::None < LockLevel::Shared);
        assert!(LockLevel::Shared < LockLevel::Reserved);
        assert!(LockLevel::Reserved < LockLevel::Pending);
        assert!(LockLevel::Pending < LockLevel::Exclusive);
    }

    #[test]
    fn error_display_is_stable() {
        assert_eq!(VfsError::ShortRead.to_string(), "short read");
        assert_eq!(VfsError::NotFound.to_string(), "not found");
        assert_eq!(
            VfsError::Codec("bad frame").to_string(),
            "codec failure: bad frame"
        );
    }

    #[test]
    fn io_errors_convert() {
        let e: VfsError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(e, VfsError::Io(_)));
    }
}
