//! One-shot zlib compression and decompression over byte slices.
//!
//! Chunks are stored as plain zlib streams with no extra framing: the
//! stream is self-delimited, so the decompressor recovers both the
//! plaintext length and the frame length from the bytes alone.  The zlib
//! header byte is never zero (the low nibble of the first byte encodes the
//! deflate method, 8), which the on-disk format exploits to tell a
//! never-written region — a sparse hole reading back as zeros — from a
//! compressed frame.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::stats;
use crate::vfs::{VfsError, VfsResult};

/// Worst-case deflate output size for `n` input bytes, with headroom for
/// the zlib wrapper.  Compressed chunk buffers are allocated at this width
/// so an incompressible chunk is detected rather than truncated.
pub fn compress_bound(n: usize) -> usize {
    n + n / 1000 + 64
}

/// Compresses `src` into `dst` at `level`, returning the frame length.
///
/// `dst` must be at least [`compress_bound`]`(src.len())` bytes; the frame
/// is then guaranteed to complete in a single pass.
pub fn compress(src: &[u8], dst: &mut [u8], level: Compression) -> VfsResult<usize> {
    stats::record_compress();
    let mut deflate = Compress::new(level, true);
    let status = deflate
        .compress(src, dst, FlushCompress::Finish)
        .map_err(|_| VfsError::Codec("deflate failed"))?;
    if status != Status::StreamEnd {
        return Err(VfsError::Codec("deflate output buffer exhausted"));
    }
    let n = deflate.total_out() as usize;
    // The zlib header byte cannot be zero; anything else would collide with
    // the hole sentinel and must never reach the disk.
    if n == 0 || dst[0] == 0 {
        return Err(VfsError::Codec("invalid frame header byte"));
    }
    Ok(n)
}

/// Decompresses the frame at the start of `src` into `dst`.
///
/// Trailing bytes after the frame (the zero tail of a chunk region) are
/// ignored.  Returns `(plaintext_len, frame_len)`.  Fails when the frame is
/// corrupt or its plaintext would overrun `dst`.
pub fn decompress(src: &[u8], dst: &mut [u8]) -> VfsResult<(usize, usize)> {
    stats::record_decompress();
    let mut inflate = Decompress::new(true);
    let status = inflate
        .decompress(src, dst, FlushDecompress::Finish)
        .map_err(|_| VfsError::Codec("inflate failed"))?;
    if status != Status::StreamEnd {
        return Err(VfsError::Codec("plaintext overruns destination"));
    }
    Ok((inflate.total_out() as usize, inflate.total_in() as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level() -> Compression {
        Compression::new(6)
    }

    #[test]
    fn roundtrip() {
        let src = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let mut comp = vec![0u8; compress_bound(src.len())];
        let n = compress(&src, &mut comp, level()).expect("compress");
        assert!(n < src.len(), "text should shrink");

        let mut plain = vec![0u8; src.len()];
        let (out, consumed) = decompress(&comp[..n], &mut plain).expect("decompress");
        assert_eq!(out, src.len());
        assert_eq!(consumed, n);
        assert_eq!(plain, src);
    }

    #[test]
    fn frame_header_byte_is_nonzero() {
        for lvl in [1u32, 6, 9] {
            let mut comp = vec![0u8; compress_bound(16)];
            let n = compress(&[0u8; 16], &mut comp, Compression::new(lvl)).expect("compress");
            assert!(n > 0);
            assert_ne!(comp[0], 0, "zlib header must not collide with the hole sentinel");
        }
    }

    #[test]
    fn trailing_zeros_are_ignored() {
        // A frame followed by a simulated hole tail decompresses cleanly and
        // reports the true frame length.
        let src = vec![0xA5u8; 4096];
        let mut region = vec![0u8; compress_bound(src.len())];
        let n = compress(&src, &mut region, level()).expect("compress");
        assert!(n < region.len());

        let mut plain = vec![0u8; src.len()];
        let (out, consumed) = decompress(&region, &mut plain).expect("decompress");
        assert_eq!(out, src.len());
        assert_eq!(consumed, n);
        assert_eq!(plain, src);
    }

    #[test]
    fn corrupt_frame_is_rejected() {
        let garbage = [0x78u8, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
        let mut plain = [0u8; 64];
        assert!(decompress(&garbage, &mut plain).is_err());
    }

    #[test]
    fn oversized_plaintext_is_rejected() {
        let src = vec![0x5Au8; 8192];
        let mut comp = vec![0u8; compress_bound(src.len())];
        let n = compress(&src, &mut comp, level()).expect("compress");
        // Destination deliberately smaller than the plaintext.
        let mut small = vec![0u8; 1024];
        assert!(matches!(
            decompress(&comp[..n], &mut small),
            Err(VfsError::Codec(_))
        ));
    }

    #[test]
    fn bound_covers_incompressible_input() {
        // A worst-case input still fits the bound at the fastest level.
        let src: Vec<u8> = (0..=255u8).cycle().take(65_536).collect();
        let mut comp = vec![0u8; compress_bound(src.len())];
        compress(&src, &mut comp, Compression::new(1)).expect("compress within bound");
    }

    #[test]
    fn deterministic_for_fixed_level_and_input() {
        let src = b"determinism matters for idempotent flushes".repeat(50);
        let mut a = vec![0u8; compress_bound(src.len())];
        let mut b = vec![0u8; compress_bound(src.len())];
        let na = compress(&src, &mut a, level()).expect("compress");
        let nb = compress(&src, &mut b, level()).expect("compress");
        assert_eq!(na, nb);
        assert_eq!(a[..na], b[..nb]);
    }
}
