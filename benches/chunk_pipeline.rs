//! Criterion benchmarks for the chunked compression pipeline.
//!
//! Run with:
//!   cargo bench --bench chunk_pipeline

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use vfscompress::vfs::{OpenFlags, Vfs, VfsFile};
use vfscompress::{CompressVfs, Options, OsVfs};

/// Moderately compressible payload: repeated text with a rolling counter.
fn payload(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut i = 0u64;
    while out.len() < len {
        out.extend_from_slice(format!("row {:08} | status=ok | ", i).as_bytes());
        i += 1;
    }
    out.truncate(len);
    out
}

fn bench_write_sync_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_pipeline");

    for &chunk_size in &[64 * 1024usize, 256 * 1024] {
        let data = payload(chunk_size * 4);
        let mut opts = Options::default();
        opts.set_chunk_size(chunk_size as i64);

        // ── write + sync: dirty four chunks and flush them ───────────────────
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("write_sync", chunk_size),
            &data,
            |b, data| {
                b.iter(|| {
                    let dir = tempfile::tempdir().unwrap();
                    let vfs = CompressVfs::new(Arc::new(OsVfs::new()), opts);
                    let mut f = vfs
                        .open(Some(&dir.path().join("bench.db")), OpenFlags::main_db())
                        .unwrap();
                    f.write(data, 0).unwrap();
                    f.sync(Default::default()).unwrap();
                    f.close().unwrap();
                })
            },
        );

        // ── cached reads: all chunks resident, no disk traffic ───────────────
        let dir = tempfile::tempdir().unwrap();
        let vfs = CompressVfs::new(Arc::new(OsVfs::new()), {
            let mut o = opts;
            o.set_cache_chunks(8);
            o
        });
        let mut f = vfs
            .open(Some(&dir.path().join("bench.db")), OpenFlags::main_db())
            .unwrap();
        f.write(&data, 0).unwrap();
        f.sync(Default::default()).unwrap();

        let mut buf = vec![0u8; chunk_size];
        group.throughput(Throughput::Bytes(chunk_size as u64));
        group.bench_with_input(
            BenchmarkId::new("cached_read", chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    f.read(&mut buf, (chunk_size / 2) as u64).unwrap();
                })
            },
        );
        f.close().unwrap();
    }

    group.finish();
}

criterion_group!(benches, bench_write_sync_read);
criterion_main!(benches);
