//! The platform root VFS: [`Vfs`]/[`VfsFile`] over `std::fs`.
//!
//! This is the filesystem every shim ultimately bottoms out in.  Reads
//! implement the host's short-read convention (zero-fill, then report);
//! locking uses advisory byte-range locks in the host database's reserved
//! lock-byte page on Unix and plain level bookkeeping elsewhere (a single
//! process never conflicts with itself through `fcntl`).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::sparse::{read_at_full, write_at_full};
use crate::trace::{vtrace, TraceLevel};
use crate::vfs::{
    AccessCheck, FileControlOp, LockLevel, OpenFlags, SyncFlags, Vfs, VfsError, VfsFile, VfsResult,
};

/// Registry name of the platform VFS.
pub const OS_VFS_NAME: &str = "os";

// The host database's lock-byte page.  All byte-range locks live in a page
// that the pager never reads or writes.
const PENDING_BYTE: u64 = 0x4000_0000;
const RESERVED_BYTE: u64 = PENDING_BYTE + 1;
const SHARED_FIRST: u64 = PENDING_BYTE + 2;
const SHARED_SIZE: u64 = 510;

/// The platform root VFS.
#[derive(Debug, Default)]
pub struct OsVfs;

impl OsVfs {
    pub fn new() -> OsVfs {
        OsVfs
    }
}

/// A file opened by [`OsVfs`].
#[derive(Debug)]
pub struct OsFile {
    file: File,
    path: Option<PathBuf>,
    delete_on_close: bool,
    lock_level: LockLevel,
}

fn temp_path() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("vfsc-{}-{}.tmp", std::process::id(), n))
}

impl Vfs for OsVfs {
    fn name(&self) -> &str {
        OS_VFS_NAME
    }

    fn open(&self, path: Option<&Path>, flags: OpenFlags) -> VfsResult<Box<dyn VfsFile>> {
        let (path_buf, delete_on_close) = match path {
            Some(p) => (p.to_path_buf(), flags.delete_on_close),
            None => (temp_path(), true),
        };

        let mut oo = OpenOptions::new();
        oo.read(true).write(!flags.read_only);
        if flags.create {
            oo.create(true);
        }
        if flags.create && flags.exclusive {
            oo.create_new(true);
        }
        let file = oo.open(&path_buf)?;
        vtrace!(
            TraceLevel::OpenClose,
            "{}.open({:?}, kind={:?})",
            OS_VFS_NAME,
            path_buf,
            flags.kind
        );

        Ok(Box::new(OsFile {
            file,
            path: Some(path_buf),
            delete_on_close,
            lock_level: LockLevel::None,
        }))
    }

    fn delete(&self, path: &Path, sync_dir: bool) -> VfsResult<()> {
        vtrace!(
            TraceLevel::NonIo,
            "{}.delete({:?}, sync_dir={})",
            OS_VFS_NAME,
            path,
            sync_dir
        );
        std::fs::remove_file(path)?;
        #[cfg(unix)]
        if sync_dir {
            if let Some(parent) = path.parent() {
                // Directory sync makes the unlink durable; failure to open
                // the directory is not fatal to the delete itself.
                if let Ok(dir) = File::open(parent) {
                    dir.sync_all()?;
                }
            }
        }
        Ok(())
    }

    fn access(&self, path: &Path, check: AccessCheck) -> VfsResult<bool> {
        let found = match std::fs::metadata(path) {
            Ok(meta) => match check {
                AccessCheck::Exists => true,
                AccessCheck::ReadWrite => !meta.permissions().readonly(),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(VfsError::Io(e)),
        };
        Ok(found)
    }

    fn full_pathname(&self, path: &Path) -> VfsResult<PathBuf> {
        match std::fs::canonicalize(path) {
            Ok(p) => Ok(p),
            // Not-yet-created files cannot be canonicalised; anchor them to
            // the working directory instead.
            Err(_) if path.is_absolute() => Ok(path.to_path_buf()),
            Err(_) => Ok(std::env::current_dir()?.join(path)),
        }
    }
}

impl OsFile {
    /// Asks the kernel whether another handle holds a write lock on the
    /// reserved byte.  Locks held through this very descriptor are not
    /// reported; the caller checks its own bookkeeping first.
    #[cfg(unix)]
    fn reserved_lock_probe(&self) -> VfsResult<bool> {
        use std::os::unix::io::AsRawFd;

        let mut fl: libc::flock = unsafe { std::mem::zeroed() };
        fl.l_type = libc::F_WRLCK as libc::c_short;
        fl.l_whence = libc::SEEK_SET as libc::c_short;
        fl.l_start = RESERVED_BYTE as libc::off_t;
        fl.l_len = 1;
        // SAFETY: fd is owned by self.file; the flock struct outlives the
        // call.
        let rc = unsafe { libc::fcntl(self.file.as_raw_fd(), libc::F_GETLK, &mut fl) };
        if rc == -1 {
            return Err(VfsError::Io(io::Error::last_os_error()));
        }
        Ok(fl.l_type != libc::F_UNLCK as libc::c_short)
    }

    #[cfg(not(unix))]
    fn reserved_lock_probe(&self) -> VfsResult<bool> {
        Ok(false)
    }

    #[cfg(unix)]
    fn range_lock(&self, kind: libc::c_int, start: u64, len: u64) -> VfsResult<()> {
        use std::os::unix::io::AsRawFd;

        let mut fl: libc::flock = unsafe { std::mem::zeroed() };
        fl.l_type = kind as libc::c_short;
        fl.l_whence = libc::SEEK_SET as libc::c_short;
        fl.l_start = start as libc::off_t;
        fl.l_len = len as libc::off_t;
        // SAFETY: fd is owned by self.file; the flock struct outlives the
        // call.
        let rc = unsafe { libc::fcntl(self.file.as_raw_fd(), libc::F_SETLK, &fl) };
        if rc == -1 {
            return Err(VfsError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl VfsFile for OsFile {
    fn read(&mut self, buf: &mut [u8], offset: u64) -> VfsResult<()> {
        let n = read_at_full(&self.file, buf, offset)?;
        if n < buf.len() {
            buf[n..].fill(0);
            return Err(VfsError::ShortRead);
        }
        Ok(())
    }

    fn write(&mut self, buf: &[u8], offset: u64) -> VfsResult<()> {
        write_at_full(&self.file, buf, offset)?;
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> VfsResult<()> {
        self.file.set_len(size)?;
        Ok(())
    }

    fn sync(&mut self, flags: SyncFlags) -> VfsResult<()> {
        if flags.data_only {
            self.file.sync_data()?;
        } else {
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn size(&mut self) -> VfsResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn lock(&mut self, level: LockLevel) -> VfsResult<()> {
        if self.lock_level >= level {
            return Ok(());
        }
        #[cfg(unix)]
        match level {
            LockLevel::None => {}
            LockLevel::Shared => self.range_lock(libc::F_RDLCK, SHARED_FIRST, SHARED_SIZE)?,
            LockLevel::Reserved => self.range_lock(libc::F_WRLCK, RESERVED_BYTE, 1)?,
            LockLevel::Pending => self.range_lock(libc::F_WRLCK, PENDING_BYTE, 1)?,
            LockLevel::Exclusive => self.range_lock(libc::F_WRLCK, SHARED_FIRST, SHARED_SIZE)?,
        }
        self.lock_level = level;
        Ok(())
    }

    fn unlock(&mut self, level: LockLevel) -> VfsResult<()> {
        if self.lock_level <= level {
            return Ok(());
        }
        #[cfg(unix)]
        match level {
            LockLevel::None => {
                self.range_lock(libc::F_UNLCK, PENDING_BYTE, 2 + SHARED_SIZE)?;
            }
            LockLevel::Shared => {
                self.range_lock(libc::F_RDLCK, SHARED_FIRST, SHARED_SIZE)?;
                self.range_lock(libc::F_UNLCK, PENDING_BYTE, 2)?;
            }
            // Downgrades to Reserved or Pending do not occur in the host's
            // lock protocol; treat them as keeping the stronger lock.
            _ => return Ok(()),
        }
        self.lock_level = level;
        Ok(())
    }

    fn check_reserved_lock(&mut self) -> VfsResult<bool> {
        if self.lock_level >= LockLevel::Reserved {
            return Ok(true);
        }
        self.reserved_lock_probe()
    }

    fn file_control(&mut self, op: FileControlOp) -> VfsResult<()> {
        match op {
            // The size hint is advisory; the file grows on demand.
            FileControlOp::SizeHint(_) => Ok(()),
            _ => Err(VfsError::NotFound),
        }
    }

    fn close(&mut self) -> VfsResult<()> {
        if self.delete_on_close {
            if let Some(path) = self.path.take() {
                // Best effort: the handle itself closes on drop regardless.
                let _ = std::fs::remove_file(path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_in(dir: &tempfile::TempDir, name: &str) -> Box<dyn VfsFile> {
        OsVfs::new()
            .open(Some(&dir.path().join(name)), OpenFlags::main_db())
            .expect("open")
    }

    #[test]
    fn write_read_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut f = open_in(&dir, "a.db");
        f.write(b"0123456789", 0).expect("write");
        let mut buf = [0u8; 10];
        f.read(&mut buf, 0).expect("read");
        assert_eq!(&buf, b"0123456789");
    }

    #[test]
    fn short_read_zero_fills_and_reports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut f = open_in(&dir, "b.db");
        f.write(b"abc", 0).expect("write");
        let mut buf = [0xFFu8; 8];
        let err = f.read(&mut buf, 0).expect_err("short read expected");
        assert!(matches!(err, VfsError::ShortRead));
        assert_eq!(&buf[..3], b"abc");
        assert!(buf[3..].iter().all(|&b| b == 0), "tail must be zero-filled");
    }

    #[test]
    fn writes_beyond_eof_extend_with_zeros() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut f = open_in(&dir, "c.db");
        f.write(b"xy", 100).expect("write");
        assert_eq!(f.size().expect("size"), 102);
        let mut buf = [0xFFu8; 102];
        f.read(&mut buf, 0).expect("read");
        assert!(buf[..100].iter().all(|&b| b == 0));
        assert_eq!(&buf[100..], b"xy");
    }

    #[test]
    fn truncate_shrinks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut f = open_in(&dir, "d.db");
        f.write(&[7u8; 512], 0).expect("write");
        f.truncate(100).expect("truncate");
        assert_eq!(f.size().expect("size"), 100);
    }

    #[test]
    fn temp_files_vanish_on_close() {
        let vfs = OsVfs::new();
        let mut f = vfs.open(None, OpenFlags::temp_db()).expect("open temp");
        f.write(b"scratch", 0).expect("write");
        f.close().expect("close");
        // Nothing observable to assert beyond success: the path is private
        // to the handle and removed by close.
    }

    #[test]
    fn delete_on_close_removes_named_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("e.db");
        let mut flags = OpenFlags::main_db();
        flags.delete_on_close = true;
        let mut f = OsVfs::new().open(Some(&path), flags).expect("open");
        f.write(b"gone soon", 0).expect("write");
        assert!(path.exists());
        f.close().expect("close");
        assert!(!path.exists());
    }

    #[test]
    fn lock_ladder_bookkeeping() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut f = open_in(&dir, "f.db");
        f.lock(LockLevel::Shared).expect("shared");
        f.lock(LockLevel::Reserved).expect("reserved");
        assert!(f.check_reserved_lock().expect("check"));
        f.lock(LockLevel::Exclusive).expect("exclusive");
        // Re-locking an already-held level is a no-op.
        f.lock(LockLevel::Shared).expect("relock");
        f.unlock(LockLevel::Shared).expect("downgrade");
        f.unlock(LockLevel::None).expect("unlock");
    }

    #[test]
    fn access_and_pathname() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vfs = OsVfs::new();
        let path = dir.path().join("g.db");
        assert!(!vfs.access(&path, AccessCheck::Exists).expect("access"));
        std::fs::write(&path, b"x").expect("seed");
        assert!(vfs.access(&path, AccessCheck::Exists).expect("access"));
        let full = vfs.full_pathname(&path).expect("full path");
        assert!(full.is_absolute());
    }

    #[test]
    fn unknown_file_control_answers_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut f = open_in(&dir, "h.db");
        assert!(matches!(
            f.file_control(FileControlOp::Other(0x1234)),
            Err(VfsError::NotFound)
        ));
        f.file_control(FileControlOp::SizeHint(1 << 20))
            .expect("size hint accepted");
    }
}
