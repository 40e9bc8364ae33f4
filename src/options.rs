//! Runtime options for the compression shim.
//!
//! Built once at registration and captured by every file the shim opens;
//! nothing here changes afterwards.  Setters normalise their input the way
//! the registration surface documents (round chunk sizes down to whole
//! compression units, falling back to the default below one unit; clamp
//! levels) and return the value actually stored.

use flate2::Compression;

use crate::config::{CACHE_CHUNKS, COMPRESSION_UNIT, DEF_CHUNK_SIZE, DEFAULT_COMPRESSION_LEVEL};

/// Tunable parameters of the shim, fixed at registration.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// zlib level handed to the codec.
    pub compression: Compression,
    /// Region width in bytes; always a positive multiple of the
    /// compression unit.
    pub chunk_size: usize,
    /// Chunk slots per open file; at least 2.
    pub cache_chunks: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            compression: Compression::new(DEFAULT_COMPRESSION_LEVEL),
            chunk_size: DEF_CHUNK_SIZE,
            cache_chunks: CACHE_CHUNKS,
        }
    }
}

impl Options {
    /// Options with all defaults applied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from the raw registration arguments:
    /// `compression_level` −1 for the library default or 1..=9, and
    /// `chunk_size_bytes` −1 (or any value below one compression unit)
    /// for the default chunk size.
    pub fn from_raw(compression_level: i32, chunk_size_bytes: i64) -> Options {
        let mut opts = Options::default();
        opts.set_compression_level(compression_level);
        opts.set_chunk_size(chunk_size_bytes);
        opts
    }

    /// Sets the zlib level: −1 selects the library default, anything else
    /// is clamped into 1..=9.  Returns the level stored.
    pub fn set_compression_level(&mut self, level: i32) -> u32 {
        let stored = if level < 0 {
            Compression::default().level()
        } else {
            level.clamp(1, 9) as u32
        };
        self.compression = Compression::new(stored);
        stored
    }

    /// Sets the chunk size in bytes.  The size is rounded down to a whole
    /// number of compression units; anything that yields no whole unit —
    /// the −1 sentinel, zero, or a positive value below one unit — selects
    /// the default instead.  Returns the size stored.
    pub fn set_chunk_size(&mut self, bytes: i64) -> usize {
        let units = if bytes <= 0 {
            0
        } else {
            bytes as usize / COMPRESSION_UNIT
        };
        self.chunk_size = if units == 0 {
            DEF_CHUNK_SIZE
        } else {
            units * COMPRESSION_UNIT
        };
        self.chunk_size
    }

    /// Sets the number of cache slots per file, with 2 as the floor.
    /// Returns the count stored.
    pub fn set_cache_chunks(&mut self, n: usize) -> usize {
        self.cache_chunks = n.max(2);
        self.cache_chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = Options::default();
        assert_eq!(o.chunk_size, 4 * COMPRESSION_UNIT);
        assert_eq!(o.cache_chunks, 2);
        assert_eq!(o.compression.level(), 6);
    }

    #[test]
    fn level_clamps_and_defaults() {
        let mut o = Options::default();
        assert_eq!(o.set_compression_level(-1), Compression::default().level());
        assert_eq!(o.set_compression_level(0), 1);
        assert_eq!(o.set_compression_level(12), 9);
        assert_eq!(o.set_compression_level(3), 3);
    }

    #[test]
    fn chunk_size_rounds_to_unit() {
        let mut o = Options::default();
        assert_eq!(o.set_chunk_size(-1), DEF_CHUNK_SIZE);
        assert_eq!(o.set_chunk_size(COMPRESSION_UNIT as i64), COMPRESSION_UNIT);
        // 100 KiB rounds down to one unit.
        assert_eq!(o.set_chunk_size(100 * 1024), COMPRESSION_UNIT);
        // 300 KiB rounds down to four units.
        assert_eq!(o.set_chunk_size(300 * 1024), 4 * COMPRESSION_UNIT);
    }

    #[test]
    fn chunk_size_below_one_unit_falls_back_to_default() {
        let mut o = Options::default();
        assert_eq!(o.set_chunk_size(0), DEF_CHUNK_SIZE);
        assert_eq!(o.set_chunk_size(1), DEF_CHUNK_SIZE);
        assert_eq!(o.set_chunk_size(30_000), DEF_CHUNK_SIZE);
        assert_eq!(
            o.set_chunk_size((COMPRESSION_UNIT - 1) as i64),
            DEF_CHUNK_SIZE
        );
    }

    #[test]
    fn cache_chunks_floor() {
        let mut o = Options::default();
        assert_eq!(o.set_cache_chunks(0), 2);
        assert_eq!(o.set_cache_chunks(8), 8);
    }

    #[test]
    fn from_raw_combines_both() {
        let o = Options::from_raw(9, (2 * COMPRESSION_UNIT) as i64);
        assert_eq!(o.compression.level(), 9);
        assert_eq!(o.chunk_size, 2 * COMPRESSION_UNIT);
    }
}
