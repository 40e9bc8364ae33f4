//! E2E: correctness under cache pressure.
//!
//! The per-file cache holds only two chunk slots by default, so touching
//! more than two regions forces eviction-with-flush on almost every miss.
//! None of that may ever be observable through the pager-facing contract.

use std::path::Path;
use std::sync::Arc;

use vfscompress::vfs::{OpenFlags, Vfs, VfsFile};
use vfscompress::{CompressVfs, Options, OsVfs};

const UNIT: usize = 64 * 1024;

fn shim(chunk_size: usize, cache_chunks: usize) -> CompressVfs {
    let mut opts = Options::default();
    opts.set_chunk_size(chunk_size as i64);
    opts.set_cache_chunks(cache_chunks);
    CompressVfs::new(Arc::new(OsVfs::new()), opts)
}

fn open(vfs: &CompressVfs, path: &Path) -> Box<dyn VfsFile> {
    vfs.open(Some(path), OpenFlags::main_db())
        .expect("failed to open main db")
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: Four chunks through two slots, read back in reverse
// ─────────────────────────────────────────────────────────────────────────────

/// Write distinct patterns into four adjacent 64 KiB chunks, then read
/// each back in reverse order; every read returns the original pattern.
#[test]
fn test_four_chunks_two_slots_reverse_readback() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("evict.db");
    let vfs = shim(UNIT, 2);

    let mut f = open(&vfs, &path);
    for i in 0u8..4 {
        f.write(&vec![0xC0 + i; UNIT], i as u64 * UNIT as u64)
            .expect("failed to write chunk");
    }
    for i in (0u8..4).rev() {
        let mut back = vec![0u8; UNIT];
        f.read(&mut back, i as u64 * UNIT as u64)
            .expect("failed to read chunk");
        assert!(
            back.iter().all(|&b| b == 0xC0 + i),
            "chunk {} lost its pattern under eviction",
            i
        );
    }
    f.close().expect("failed to close");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: Ping-pong between alternating regions
// ─────────────────────────────────────────────────────────────────────────────

/// Alternating partial writes to three regions through two slots keep
/// every region's accumulated content intact.
#[test]
fn test_ping_pong_partial_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pingpong.db");
    let vfs = shim(UNIT, 2);

    let mut f = open(&vfs, &path);
    // Interleave 64 slices across three regions: region r gets byte value
    // r at slice positions 0,3,6,… so each region accumulates a distinct
    // striped pattern across many eviction cycles.
    const SLICE: usize = 1024;
    for step in 0..64 {
        let region = step % 3;
        let slice = step / 3;
        let payload = vec![0xE0 + region as u8; SLICE];
        f.write(
            &payload,
            (region * UNIT + slice * SLICE) as u64,
        )
        .expect("failed to write slice");
    }

    for region in 0u8..3 {
        let slices = if region < 64 % 3 { 22 } else { 21 };
        let mut back = vec![0u8; UNIT];
        let err = f.read(&mut back, region as u64 * UNIT as u64);
        // Regions past the physical extent may report a short read; the
        // data bytes are still authoritative.
        let _ = err;
        for s in 0..slices {
            assert!(
                back[s * SLICE..(s + 1) * SLICE]
                    .iter()
                    .all(|&b| b == 0xE0 + region),
                "region {} slice {} corrupted",
                region,
                s
            );
        }
    }
    f.close().expect("failed to close");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: Eviction flushes are durable without an explicit sync
// ─────────────────────────────────────────────────────────────────────────────

/// With two slots, writing a third region forces the first to disk; the
/// raw file already holds its frame before any sync.
#[test]
fn test_eviction_writes_through() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("writethrough.db");
    let vfs = shim(UNIT, 2);

    let mut f = open(&vfs, &path);
    f.write(&vec![0x31u8; UNIT], 0).expect("failed to write");
    f.write(&vec![0x32u8; UNIT], UNIT as u64)
        .expect("failed to write");
    assert_eq!(
        std::fs::metadata(&path).expect("stat").len(),
        0,
        "nothing may hit the disk before the cache fills"
    );

    f.write(&vec![0x33u8; UNIT], 2 * UNIT as u64)
        .expect("failed to write");
    assert!(
        std::fs::metadata(&path).expect("stat").len() > 0,
        "the evicted chunk must have been flushed"
    );
    f.close().expect("failed to close");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: A larger cache absorbs the same workload without early flushes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_larger_cache_defers_flushes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bigcache.db");
    let vfs = shim(UNIT, 8);

    let mut f = open(&vfs, &path);
    for i in 0u8..6 {
        f.write(&vec![0x40 + i; UNIT], i as u64 * UNIT as u64)
            .expect("failed to write chunk");
    }
    assert_eq!(
        std::fs::metadata(&path).expect("stat").len(),
        0,
        "six dirty chunks fit in eight slots"
    );
    f.sync(Default::default()).expect("failed to sync");
    assert!(std::fs::metadata(&path).expect("stat").len() > 0);

    for i in (0u8..6).rev() {
        let mut back = vec![0u8; UNIT];
        f.read(&mut back, i as u64 * UNIT as u64)
            .expect("failed to read chunk");
        assert!(back.iter().all(|&b| b == 0x40 + i));
    }
    f.close().expect("failed to close");
}
