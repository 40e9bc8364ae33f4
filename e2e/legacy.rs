//! E2E: legacy plain database files bypass the pipeline untouched.
//!
//! A main database whose first 14 bytes carry the plain-database signature
//! is never compressed: reads and writes go straight to the underlying
//! file, and a no-op open/close leaves the file byte-identical.

use std::path::Path;
use std::sync::Arc;

use vfscompress::vfs::{OpenFlags, Vfs, VfsFile};
use vfscompress::{CompressVfs, Options, OsVfs};

const SIGNATURE: &[u8] = b"SQLite format 3\0";

fn shim() -> CompressVfs {
    CompressVfs::new(Arc::new(OsVfs::new()), Options::default())
}

fn seed_legacy_file(path: &Path, payload_len: usize) -> Vec<u8> {
    let mut content = Vec::with_capacity(SIGNATURE.len() + payload_len);
    content.extend_from_slice(SIGNATURE);
    content.extend((0..payload_len).map(|i| (i * 7 + 3) as u8));
    std::fs::write(path, &content).expect("failed to seed legacy file");
    content
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: No-op open/close is byte-identical
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_noop_open_close_preserves_bytes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("legacy.db");
    let before = seed_legacy_file(&path, 4096);

    let vfs = shim();
    let mut f = vfs
        .open(Some(&path), OpenFlags::main_db())
        .expect("failed to open");
    f.close().expect("failed to close");

    let after = std::fs::read(&path).expect("failed to read raw");
    assert_eq!(before, after, "open/close must not rewrite a legacy file");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: Reads come from the raw file
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_reads_are_raw() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("legacy.db");
    let content = seed_legacy_file(&path, 4096);

    let vfs = shim();
    let mut f = vfs
        .open(Some(&path), OpenFlags::main_db())
        .expect("failed to open");

    let mut buf = [0u8; 100];
    f.read(&mut buf, 0).expect("failed to read");
    assert_eq!(&buf[..], &content[..100]);

    let mut mid = [0u8; 64];
    f.read(&mut mid, 1000).expect("failed to read middle");
    assert_eq!(&mid[..], &content[1000..1064]);
    f.close().expect("failed to close");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: Writes land verbatim on disk
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_writes_are_raw() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("legacy.db");
    let mut content = seed_legacy_file(&path, 4096);

    let vfs = shim();
    let mut f = vfs
        .open(Some(&path), OpenFlags::main_db())
        .expect("failed to open");
    f.write(&[0xEEu8; 128], 512).expect("failed to write");
    f.sync(Default::default()).expect("failed to sync");
    f.close().expect("failed to close");

    content[512..640].fill(0xEE);
    let after = std::fs::read(&path).expect("failed to read raw");
    assert_eq!(content, after, "legacy writes must land uncompressed");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: Legacy status persists across reopens
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_legacy_file_stays_legacy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("legacy.db");
    seed_legacy_file(&path, 1024);

    let vfs = shim();
    for _ in 0..3 {
        let mut f = vfs
            .open(Some(&path), OpenFlags::main_db())
            .expect("failed to open");
        let mut sig = [0u8; 16];
        f.read(&mut sig, 0).expect("failed to read signature");
        assert_eq!(&sig[..], SIGNATURE, "signature must survive every cycle");
        f.close().expect("failed to close");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: A signature prefix shorter than 14 bytes is not legacy
// ─────────────────────────────────────────────────────────────────────────────

/// A file holding only part of the signature is treated as compressed
/// content, not as a legacy database.
#[test]
fn test_truncated_signature_is_not_legacy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stub.db");
    std::fs::write(&path, b"SQLite").expect("failed to seed");

    let vfs = shim();
    // Opening must succeed; the file is routed through the compressed
    // path, whose loader will reject the junk frame on first access.
    let mut f = vfs
        .open(Some(&path), OpenFlags::main_db())
        .expect("failed to open");
    let mut buf = [0u8; 4];
    assert!(
        f.read(&mut buf, 0).is_err(),
        "junk content must not decode as a chunk"
    );
    f.close().expect("failed to close");
}
