//! A compressing VFS shim for an embedded SQL database.
//!
//! The shim sits between the host database's pager and the platform
//! filesystem.  The pager sees a flat, byte-addressable file; on disk the
//! main database is divided into fixed-size chunks, each stored as one
//! zlib frame followed by a sparse hole.  A small per-file cache of
//! decompressed chunks absorbs the pager's reads and writes; dirty chunks
//! are recompressed and written back on sync, eviction, and close.
//!
//! ```no_run
//! // Install as the default VFS: trace off, level 6, default chunk size.
//! vfscompress::register(0, 6, -1).unwrap();
//! ```
//!
//! Pre-existing plain database files are recognised by their header
//! signature and served untouched; journals, WAL files, and temp files
//! always bypass the pipeline.

pub mod cache;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod options;
pub mod shim;
pub mod sparse;
pub mod stats;
pub mod trace;
pub mod vfs;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level re-exports: the surface most embedders need.
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime options captured at registration.
pub use options::Options;
/// The compressing VFS shim.
pub use shim::{CompressVfs, SHIM_VFS_NAME};
/// The VFS contract and its error type.
pub use vfs::{Vfs, VfsError, VfsFile, VfsResult};
/// The platform root VFS.
pub use vfs::os::{OsVfs, OS_VFS_NAME};

use trace::{vtrace, TraceLevel};

static REGISTERED: AtomicBool = AtomicBool::new(false);

/// Installs the compression shim as the process default VFS.
///
/// - `trace` — trace level, 0 (off) through 7 (maximum); a negative value
///   enables tracing at the default registration tier.
/// - `compression_level` — −1 for the library default, else 1 (fastest)
///   through 9 (best).
/// - `chunk_size_bytes` — −1, or any value below 64 KiB, for the default
///   (4 × 64 KiB); else rounded down to a multiple of 64 KiB.
///
/// May be called once per process; later calls return
/// [`VfsError::Misuse`].  Returns [`VfsError::NotFound`] when the platform
/// root VFS is missing from the registry.
pub fn register(trace: i32, compression_level: i32, chunk_size_bytes: i64) -> VfsResult<()> {
    if REGISTERED.load(Ordering::SeqCst) {
        return Err(VfsError::Misuse("compression shim already registered"));
    }

    trace::set_level(trace);
    let options = Options::from_raw(compression_level, chunk_size_bytes);
    let root = vfs::registry::find(OS_VFS_NAME).ok_or(VfsError::NotFound)?;
    let shim = CompressVfs::new(root, options);
    vtrace!(
        TraceLevel::Registration,
        "{}.enabled_for(\"{}\") - chunk size: {} KiB, level: {}, cache: {} chunks",
        SHIM_VFS_NAME,
        OS_VFS_NAME,
        options.chunk_size / config::KB,
        options.compression.level(),
        options.cache_chunks
    );
    vfs::registry::register(Arc::new(shim), true);
    REGISTERED.store(true, Ordering::SeqCst);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::OpenFlags;

    #[test]
    fn register_installs_default_and_rejects_reconfiguration() {
        register(0, 6, -1).expect("first registration");
        assert_eq!(vfs::registry::default_vfs().name(), SHIM_VFS_NAME);

        // The shim is reachable by name and opens working files.
        let shim = vfs::registry::find(SHIM_VFS_NAME).expect("find shim");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reg.db");
        let mut f = shim.open(Some(&path), OpenFlags::main_db()).expect("open");
        f.write(b"registered", 0).expect("write");
        let mut buf = [0u8; 10];
        f.read(&mut buf, 0).expect("read");
        assert_eq!(&buf, b"registered");
        f.close().expect("close");

        assert!(matches!(
            register(0, 6, -1),
            Err(VfsError::Misuse(_))
        ));
    }
}
