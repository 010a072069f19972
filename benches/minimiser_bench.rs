use criterion::{black_box, criterion_group, criterion_main, Criterion};
use seqkmer::{scan_minimisers, Shape};

fn random_sequence(len: usize) -> Vec<u8> {
    const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];
    let mut state = 0x243F_6A88_85A3_08D3u64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            BASES[(state % 4) as usize]
        })
        .collect()
}

fn hash_stream_benchmark(c: &mut Criterion) {
    let shape = Shape::ungapped(20);
    let seq = random_sequence(10_000);
    c.bench_function("shape_hash_stream_10k", |b| {
        b.iter(|| shape.hash_stream(black_box(&seq)).count())
    });
}

fn scan_minimisers_benchmark(c: &mut Criterion) {
    let shape = Shape::ungapped(20);
    let seq = random_sequence(10_000);
    c.bench_function("scan_minimisers_10k", |b| {
        b.iter(|| scan_minimisers(black_box(&seq), &shape, 23))
    });
}

criterion_group!(benches, hash_stream_benchmark, scan_minimisers_benchmark);
criterion_main!(benches);
