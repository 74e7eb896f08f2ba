use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use sxd_namespace::__internal::StringPool;

fn single_uri(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_uri");

    let original = "http://www.w3.org/2000/svg";

    group.throughput(Throughput::Bytes(original.len() as u64));
    group.bench_function("single_uri", |b| {
        let pool = StringPool::new();
        b.iter(|| pool.intern(original));
    });

    group.finish();
}

fn many_unique_uris(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_unique_uris");

    let uris: Vec<_> = (0..1000).map(|i| format!("urn:example:{i}")).collect();
    let total_len = uris.iter().map(|s| s.len()).sum::<usize>();

    group.throughput(Throughput::Bytes(total_len as u64));
    group.bench_function("many_unique_uris", |b| {
        let pool = StringPool::new();

        b.iter(|| {
            for s in &uris {
                pool.intern(s);
            }
        });
    });

    group.finish();
}

fn many_repeated_prefixes(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_repeated_prefixes");

    let prefixes: Vec<_> = (0..1000).map(|i| format!("p{}", i % 100)).collect();
    let total_len = prefixes.iter().map(|s| s.len()).sum::<usize>();

    group.throughput(Throughput::Bytes(total_len as u64));
    group.bench_function("many_repeated_prefixes", |b| {
        let pool = StringPool::new();

        b.iter(|| {
            for s in &prefixes {
                pool.intern(s);
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    single_uri,
    many_unique_uris,
    many_repeated_prefixes,
);
criterion_main!(benches);
