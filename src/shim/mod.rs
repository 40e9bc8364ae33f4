//! The compression VFS shim.
//!
//! [`CompressVfs`] wraps a root [`Vfs`] and intercepts exactly one method:
//! `open`.  Main database files are sniffed and, unless they carry the
//! plain-database signature, routed through [`CompressedFile`].  Journals,
//! WAL files, temp files — and legacy plain databases — pass straight
//! through to the root VFS.  Every other VFS method forwards unchanged.

mod file;

pub use file::CompressedFile;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PLAIN_DB_SIGNATURE;
use crate::options::Options;
use crate::sparse::SparseFile;
use crate::trace::{vtrace, TraceLevel};
use crate::vfs::{AccessCheck, FileKind, OpenFlags, Vfs, VfsFile, VfsResult};

/// Registry name of the compression shim.
pub const SHIM_VFS_NAME: &str = "vfscompress";

/// A [`Vfs`] that compresses main database files in chunks.
pub struct CompressVfs {
    root: Arc<dyn Vfs>,
    options: Options,
}

impl CompressVfs {
    /// Wraps `root`.  The options are captured here and shared by every
    /// file this shim opens.
    pub fn new(root: Arc<dyn Vfs>, options: Options) -> CompressVfs {
        CompressVfs { root, options }
    }

    /// The options this shim was built with.
    pub fn options(&self) -> &Options {
        &self.options
    }
}

/// Base name of a path, for trace output.
fn file_tail(path: Option<&Path>) -> String {
    path.and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<temp>".to_owned())
}

impl Vfs for CompressVfs {
    fn name(&self) -> &str {
        SHIM_VFS_NAME
    }

    fn open(&self, path: Option<&Path>, flags: OpenFlags) -> VfsResult<Box<dyn VfsFile>> {
        let real = self.root.open(path, flags)?;
        let name = file_tail(path);
        vtrace!(
            TraceLevel::OpenClose,
            "{}.open({}, kind={:?})",
            SHIM_VFS_NAME,
            name,
            flags.kind
        );

        // Only main database files are candidates for compression; the
        // pager's journals and temp files keep their native format.
        let path = match (flags.kind, path) {
            (FileKind::MainDb, Some(p)) => p,
            _ => return Ok(real),
        };

        // The sparse handle is how chunks shed their tails.  If it cannot
        // be had, compression is off the table for this file — an open
        // never fails over an optimisation.
        let sparse = match SparseFile::open(path) {
            Ok(s) => s,
            Err(e) => {
                vtrace!(
                    TraceLevel::OpenClose,
                    "> {}.open({}) -> no sparse handle ({}); plain passthrough",
                    SHIM_VFS_NAME,
                    name,
                    e
                );
                return Ok(real);
            }
        };

        // Sniff the header: an empty file starts compressed, a plain
        // signature keeps the file on the passthrough path forever, and
        // anything else is one of ours.
        let mut header = [0u8; PLAIN_DB_SIGNATURE.len()];
        let n = sparse.read_prefix(&mut header).unwrap_or(0);
        let plain = n == header.len() && &header == PLAIN_DB_SIGNATURE;
        vtrace!(
            TraceLevel::OpenClose,
            "> {}.open({}) -> {}",
            SHIM_VFS_NAME,
            name,
            if plain { "plain" } else { "compressed" }
        );
        if plain {
            return Ok(real);
        }

        Ok(Box::new(CompressedFile::new(
            real,
            sparse,
            &self.options,
            name,
        )))
    }

    fn delete(&self, path: &Path, sync_dir: bool) -> VfsResult<()> {
        vtrace!(
            TraceLevel::NonIo,
            "{}.delete({:?}, {})",
            SHIM_VFS_NAME,
            path,
            sync_dir
        );
        self.root.delete(path, sync_dir)
    }

    fn access(&self, path: &Path, check: AccessCheck) -> VfsResult<bool> {
        vtrace!(
            TraceLevel::NonIo,
            "{}.access({:?}, {:?})",
            SHIM_VFS_NAME,
            path,
            check
        );
        self.root.access(path, check)
    }

    fn full_pathname(&self, path: &Path) -> VfsResult<PathBuf> {
        self.root.full_pathname(path)
    }
}
