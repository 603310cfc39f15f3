use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dht_core::filter::{filter_size, BloomFilter};

fn entries(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("entry-{}", i).into_bytes()).collect()
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("bloom_add");
    for n in [16usize, 256, 4096] {
        let data = entries(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &data, |b, data| {
            b.iter(|| {
                let mut bf = BloomFilter::with_mutator(filter_size(data.len()), 0x5eed).unwrap();
                for e in data {
                    bf.add(black_box(e));
                }
                bf
            })
        });
    }
    group.finish();
}

fn bench_contains(c: &mut Criterion) {
    let data = entries(1024);
    let mut bf = BloomFilter::with_mutator(filter_size(data.len()), 0x5eed).unwrap();
    for e in &data {
        bf.add(e);
    }
    let probes = entries(2048);

    c.bench_function("bloom_contains_1024", |b| {
        b.iter(|| probes.iter().filter(|p| bf.contains(black_box(p))).count())
    });
}

criterion_group!(benches, bench_add, bench_contains);
criterion_main!(benches);
