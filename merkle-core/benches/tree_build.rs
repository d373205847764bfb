use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use merkle_core::{HashStrategy, MerkleTree};

fn make_payloads(count: usize, width: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let mut bytes = (i as u64).to_le_bytes().to_vec();
            bytes.resize(width, 0xab);
            bytes
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let sizes = [100usize, 1_000, 10_000];
    let strategies = [
        HashStrategy::sha256(),
        HashStrategy::sha1(),
        HashStrategy::md5(),
    ];

    for strategy in &strategies {
        let mut group = c.benchmark_group(format!("build_{}", strategy.name()));
        for &size in &sizes {
            let payloads = make_payloads(size, 256);
            group.throughput(Throughput::Elements(size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(size), &payloads, |b, payloads| {
                b.iter(|| {
                    MerkleTree::with_strategy(black_box(payloads), strategy.clone()).unwrap()
                });
            });
        }
        group.finish();
    }
}

fn bench_prove_verify(c: &mut Criterion) {
    let strategy = HashStrategy::sha256();
    let payloads = make_payloads(1 << 12, 256);
    let tree = MerkleTree::with_strategy(&payloads, strategy.clone()).unwrap();

    c.bench_function("prove_index_4096", |b| {
        b.iter(|| tree.prove_index(black_box(1234)).unwrap());
    });

    let witness = tree.prove_index(1234).unwrap();
    c.bench_function("verify_4096", |b| {
        b.iter(|| black_box(&witness).verify(&strategy));
    });
}

criterion_group!(benches, bench_build, bench_prove_verify);
criterion_main!(benches);
