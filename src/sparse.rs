//! Sparse-region support for the physical database file.
//!
//! Every chunk region ends in a tail of bytes that carries no data.  The
//! sparse sink discards that tail so the filesystem can reclaim the blocks:
//! a subsequent read of the range observes zeros, and on a supporting
//! filesystem the range consumes no storage.
//!
//! Backends:
//! - Linux — `fallocate(FALLOC_FL_PUNCH_HOLE | FALLOC_FL_KEEP_SIZE)`,
//!   falling back to zero-fill when the filesystem refuses.
//! - Windows — the handle is marked sparse at open
//!   (`FSCTL_SET_SPARSE`) and ranges are discarded with
//!   `FSCTL_SET_ZERO_DATA`.
//! - Everywhere else — explicit zero-fill: correct reads, no reclamation.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use crate::trace::{vtrace, TraceLevel};

/// Whether this build can deallocate ranges in place.
pub const HOLE_PUNCH_AVAILABLE: bool = cfg!(has_hole_punch);

/// Zero-fill segment width for the fallback path (32 KiB).
const ZERO_SEGMENT: usize = 32 * 1024;

/// A second read/write handle on the physical database file, able to
/// discard byte ranges.  The underlying VFS keeps its own handle; this one
/// exists because range deallocation needs a raw platform handle.
#[derive(Debug)]
pub struct SparseFile {
    file: File,
}

impl SparseFile {
    /// Opens an existing file for sparse maintenance.  The file must have
    /// been created already (the underlying VFS opens it first).  On
    /// Windows the handle is additionally marked sparse; failure to do so
    /// fails the open, and the caller is expected to fall back to the
    /// uncompressed path.
    pub fn open(path: &Path) -> io::Result<SparseFile> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        #[cfg(windows)]
        mark_sparse(&file)?;
        Ok(SparseFile { file })
    }

    /// Reads up to `buf.len()` bytes from the start of the file, returning
    /// how many bytes were available.  Used to sniff the header signature.
    pub fn read_prefix(&self, buf: &mut [u8]) -> io::Result<usize> {
        read_at_full(&self.file, buf, 0)
    }

    /// Discards `[offset, offset + len)`: afterwards the range reads back
    /// as zeros and the filesystem may reclaim it.  A zero-length range is
    /// a no-op.
    pub fn discard(&self, offset: u64, len: u64) -> io::Result<()> {
        if len == 0 {
            return Ok(());
        }
        vtrace!(
            TraceLevel::Trace,
            "> sparse.discard(ofst={}, n={})",
            offset,
            len
        );
        self.punch(offset, len)
    }

    #[cfg(all(has_hole_punch, target_os = "linux"))]
    fn punch(&self, offset: u64, len: u64) -> io::Result<()> {
        use nix::fcntl::{fallocate, FallocateFlags};

        let flags = FallocateFlags::FALLOC_FL_PUNCH_HOLE | FallocateFlags::FALLOC_FL_KEEP_SIZE;
        match fallocate(&self.file, flags, offset as libc::off_t, len as libc::off_t) {
            Ok(()) => Ok(()),
            // Filesystem without punch support: keep the read-back contract.
            Err(nix::errno::Errno::EOPNOTSUPP) => self.zero_fill(offset, len),
            Err(e) => Err(io::Error::from(e)),
        }
    }

    #[cfg(all(has_hole_punch, windows))]
    fn punch(&self, offset: u64, len: u64) -> io::Result<()> {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::ioapiset::DeviceIoControl;
        use winapi::um::winioctl::{FILE_ZERO_DATA_INFORMATION, FSCTL_SET_ZERO_DATA};

        let mut info: FILE_ZERO_DATA_INFORMATION = unsafe { std::mem::zeroed() };
        unsafe {
            *info.FileOffset.QuadPart_mut() = offset as i64;
            *info.BeyondFinalZero.QuadPart_mut() = (offset + len) as i64;
        }
        let mut returned: winapi::shared::minwindef::DWORD = 0;
        // SAFETY: the handle is owned by `self.file` and the in/out buffers
        // outlive the call.
        let ok = unsafe {
            DeviceIoControl(
                self.file.as_raw_handle() as _,
                FSCTL_SET_ZERO_DATA,
                &mut info as *mut _ as *mut _,
                std::mem::size_of::<FILE_ZERO_DATA_INFORMATION>() as u32,
                std::ptr::null_mut(),
                0,
                &mut returned,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(has_hole_punch))]
    fn punch(&self, offset: u64, len: u64) -> io::Result<()> {
        self.zero_fill(offset, len)
    }

    /// Writes zeros over the range in fixed segments.  Reclaims nothing,
    /// but a later read still observes zeros.
    #[allow(dead_code)]
    fn zero_fill(&self, mut offset: u64, mut len: u64) -> io::Result<()> {
        let zeros = [0u8; ZERO_SEGMENT];
        while len > 0 {
            let step = (len as usize).min(ZERO_SEGMENT);
            write_at_full(&self.file, &zeros[..step], offset)?;
            offset += step as u64;
            len -= step as u64;
        }
        Ok(())
    }
}

/// Marks a Windows handle sparse so zeroed ranges are deallocated.
#[cfg(windows)]
fn mark_sparse(file: &File) -> io::Result<()> {
    use std::os::windows::io::AsRawHandle;
    use winapi::um::ioapiset::DeviceIoControl;
    use winapi::um::winioctl::FSCTL_SET_SPARSE;

    let mut returned: winapi::shared::minwindef::DWORD = 0;
    // SAFETY: no in/out buffers; the handle is owned by `file`.
    let ok = unsafe {
        DeviceIoControl(
            file.as_raw_handle() as _,
            FSCTL_SET_SPARSE,
            std::ptr::null_mut(),
            0,
            std::ptr::null_mut(),
            0,
            &mut returned,
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Positioned I/O helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Reads at `offset` until `buf` is full or end-of-file; returns the byte
/// count actually read.
pub(crate) fn read_at_full(file: &File, buf: &mut [u8], mut offset: u64) -> io::Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match pread(file, &mut buf[filled..], offset) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Writes all of `buf` at `offset`.
pub(crate) fn write_at_full(file: &File, buf: &[u8], mut offset: u64) -> io::Result<()> {
    let mut written = 0usize;
    while written < buf.len() {
        match pwrite(file, &buf[written..], offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => {
                written += n;
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(unix)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(windows)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}
