//! Secondary index benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use polystore_bench::generate_people;
use polystore_testkit::{Person, TestDatastore};

/// Compare an indexed lookup (`lastname`) with a scan (`age`).
fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");

    for count in [100, 1000, 10_000].iter() {
        let test = TestDatastore::memory();
        let mut session = test.session();
        for mut person in generate_people(*count, 100) {
            session.persist(&mut person).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("indexed", count), count, |b, _| {
            b.iter(|| {
                black_box(
                    session
                        .find_all_by::<Person>("lastname", black_box("last_7"), None)
                        .unwrap(),
                );
            });
        });

        group.bench_with_input(BenchmarkId::new("scan", count), count, |b, _| {
            b.iter(|| {
                black_box(
                    session
                        .find_all_by::<Person>("age", black_box(42), None)
                        .unwrap(),
                );
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_find);
criterion_main!(benches);
