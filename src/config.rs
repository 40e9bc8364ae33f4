// config.rs — Compile-time configuration constants.

/// One kibibyte.
pub const KB: usize = 1 << 10;
/// One mebibyte.
pub const MB: usize = 1 << 20;

/// The compression unit: the minimum chunk granularity, equal to the host
/// database's maximum page size.  Chunk sizes are always a positive multiple
/// of this value.
pub const COMPRESSION_UNIT: usize = 64 * KB;

/// Default chunk size (4 compression units).  Memory consumption per cached
/// chunk is roughly twice the chunk size: one plaintext buffer plus one
/// compressed buffer.
pub const DEF_CHUNK_SIZE: usize = 4 * COMPRESSION_UNIT;

/// Number of chunk slots in each open file's cache.  Must be at least 2 so
/// that a request straddling a chunk boundary cannot evict the chunk it is
/// still copying from.
pub const CACHE_CHUNKS: usize = 2;

/// Default zlib compression level.  Valid levels are 1 (fastest) through
/// 9 (best); -1 selects the library default.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// First bytes of a plain (uncompressed) host database file.  A main
/// database file beginning with this signature bypasses the compression
/// pipeline entirely.
pub const PLAIN_DB_SIGNATURE: &[u8; 14] = b"SQLite format ";
