//! E2E: pager-facing round trips through the compression pipeline.
//!
//! Everything the pager writes must come back bit-exact, whatever the
//! chunk layout underneath — within one chunk, across chunk boundaries,
//! across close/reopen, and under overlapping partial writes.

use std::path::Path;
use std::sync::Arc;

use vfscompress::vfs::{OpenFlags, Vfs, VfsFile};
use vfscompress::{CompressVfs, Options, OsVfs};

const UNIT: usize = 64 * 1024;

fn shim(chunk_size: usize) -> CompressVfs {
    let mut opts = Options::default();
    opts.set_chunk_size(chunk_size as i64);
    CompressVfs::new(Arc::new(OsVfs::new()), opts)
}

fn open(vfs: &CompressVfs, path: &Path) -> Box<dyn VfsFile> {
    vfs.open(Some(path), OpenFlags::main_db())
        .expect("failed to open main db")
}

/// Small deterministic generator for test payloads.
struct XorShift64(u64);

impl XorShift64 {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn fill(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = (self.next() & 0xFF) as u8;
        }
    }

    /// Uniform printable ASCII — incompressible enough to exercise the
    /// codec, compressible enough that every frame fits its region.
    fn fill_printable(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = b' ' + (self.next() % 95) as u8;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: Tiny round trip across close and reopen
// ─────────────────────────────────────────────────────────────────────────────

/// Write "hello" at offset 0, close, reopen, read 5 bytes at offset 0.
#[test]
fn test_tiny_roundtrip_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tiny.db");
    let vfs = shim(UNIT);

    let mut f = open(&vfs, &path);
    f.write(b"hello", 0).expect("failed to write");
    f.close().expect("failed to close");

    let mut f = open(&vfs, &path);
    let mut buf = [0u8; 5];
    f.read(&mut buf, 0).expect("failed to read");
    assert_eq!(&buf, b"hello");
    f.close().expect("failed to close");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: Multi-chunk write at an unaligned offset
// ─────────────────────────────────────────────────────────────────────────────

/// With the default 256 KiB chunk, write 300 000 bytes of 0xA5 at offset
/// 100 000, sync, reopen, read back.  The request covers two chunks and is
/// aligned to neither edge.
#[test]
fn test_multi_chunk_write_roundtrip() {
    const OFFSET: u64 = 100_000;
    const LEN: usize = 300_000;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("multi.db");
    let vfs = shim(4 * UNIT);

    let mut f = open(&vfs, &path);
    f.write(&vec![0xA5u8; LEN], OFFSET).expect("failed to write");
    f.sync(Default::default()).expect("failed to sync");
    f.close().expect("failed to close");

    let mut f = open(&vfs, &path);
    let mut back = vec![0u8; LEN];
    f.read(&mut back, OFFSET).expect("failed to read");
    assert!(back.iter().all(|&b| b == 0xA5), "payload must round-trip");

    // The zero prefix below the write is observable too.
    let mut prefix = vec![0xFFu8; OFFSET as usize];
    f.read(&mut prefix, 0).expect("failed to read prefix");
    assert!(prefix.iter().all(|&b| b == 0));
    f.close().expect("failed to close");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: Overwrite within a chunk
// ─────────────────────────────────────────────────────────────────────────────

/// Write 1000 random bytes at offset 0, overwrite 500 zeros at offset 200,
/// then read 1000 bytes: first 200 original, next 500 zero, last 300
/// original.
#[test]
fn test_overwrite_within_chunk_splices() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("overwrite.db");
    let vfs = shim(UNIT);

    let mut original = vec![0u8; 1000];
    XorShift64(0x1234_5678_9ABC_DEF0).fill(&mut original);

    let mut f = open(&vfs, &path);
    f.write(&original, 0).expect("failed to write original");
    f.write(&[0u8; 500], 200).expect("failed to overwrite");

    let mut back = vec![0u8; 1000];
    f.read(&mut back, 0).expect("failed to read");
    assert_eq!(&back[..200], &original[..200]);
    assert!(back[200..700].iter().all(|&b| b == 0));
    assert_eq!(&back[700..], &original[700..]);
    f.close().expect("failed to close");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: Idempotent flush
// ─────────────────────────────────────────────────────────────────────────────

/// Two syncs with no intervening write leave the physical file
/// byte-identical to one sync.
#[test]
fn test_sync_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("idem.db");
    let vfs = shim(UNIT);

    let mut payload = vec![0u8; 3 * UNIT];
    XorShift64(42).fill_printable(&mut payload);

    let mut f = open(&vfs, &path);
    f.write(&payload, 0).expect("failed to write");
    f.sync(Default::default()).expect("first sync");
    let after_first = std::fs::read(&path).expect("failed to read raw");

    f.sync(Default::default()).expect("second sync");
    let after_second = std::fs::read(&path).expect("failed to read raw");
    assert_eq!(after_first, after_second, "second sync must change nothing");
    f.close().expect("failed to close");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: Reads crossing several chunks at once
// ─────────────────────────────────────────────────────────────────────────────

/// A single read spanning four chunks returns exactly what four separate
/// per-chunk writes put there.
#[test]
fn test_read_spanning_four_chunks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("span.db");
    let vfs = shim(UNIT);

    let mut f = open(&vfs, &path);
    for i in 0u8..4 {
        let pattern = vec![0x10 + i; UNIT];
        f.write(&pattern, i as u64 * UNIT as u64)
            .expect("failed to write chunk");
    }

    let mut back = vec![0u8; 4 * UNIT];
    f.read(&mut back, 0).expect("failed to read span");
    for i in 0usize..4 {
        assert!(
            back[i * UNIT..(i + 1) * UNIT]
                .iter()
                .all(|&b| b == 0x10 + i as u8),
            "chunk {} corrupted",
            i
        );
    }
    f.close().expect("failed to close");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: Interleaved reads and writes against a reference model
// ─────────────────────────────────────────────────────────────────────────────

/// Random overlapping writes and reads behave exactly like a plain byte
/// array of the same logical content.
#[test]
fn test_matches_flat_file_model() {
    const LOGICAL: usize = 6 * UNIT;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("model.db");
    let vfs = shim(UNIT);

    let mut rng = XorShift64(0xDEAD_BEEF_CAFE_F00D);
    let mut model = vec![0u8; LOGICAL];
    let mut f = open(&vfs, &path);

    // Seed the whole logical range so later reads never fall off the end.
    rng.fill_printable(&mut model);
    f.write(&model, 0).expect("failed to seed");

    for round in 0..200 {
        let offset = (rng.next() as usize) % (LOGICAL - 1);
        let max_len = (LOGICAL - offset).min(3 * UNIT / 2);
        let len = 1 + (rng.next() as usize) % max_len;

        if round % 3 == 0 {
            let mut data = vec![0u8; len];
            rng.fill_printable(&mut data);
            f.write(&data, offset as u64).expect("failed to write");
            model[offset..offset + len].copy_from_slice(&data);
        } else {
            let mut got = vec![0u8; len];
            f.read(&mut got, offset as u64).expect("failed to read");
            assert_eq!(
                got,
                &model[offset..offset + len],
                "divergence at offset {} len {} (round {})",
                offset,
                len,
                round
            );
        }

        if round % 50 == 49 {
            f.sync(Default::default()).expect("failed to sync");
        }
    }
    f.close().expect("failed to close");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: Reopen sees flushed state only through sync and close
// ─────────────────────────────────────────────────────────────────────────────

/// Data written and synced, then mutated and closed: the reopened file
/// reflects the close-time flush.
#[test]
fn test_close_flushes_last_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("lastwrite.db");
    let vfs = shim(UNIT);

    let mut f = open(&vfs, &path);
    f.write(&[0x01u8; 4096], 0).expect("failed to write");
    f.sync(Default::default()).expect("failed to sync");
    f.write(&[0x02u8; 4096], 0).expect("failed to overwrite");
    f.close().expect("failed to close");

    let mut f = open(&vfs, &path);
    let mut buf = [0u8; 4096];
    f.read(&mut buf, 0).expect("failed to read");
    assert!(buf.iter().all(|&b| b == 0x02));
    f.close().expect("failed to close");
}
