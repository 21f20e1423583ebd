use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use namestore::{RowPatch, Store, Table, TableBuilder};

fn build_patches(count: usize) -> Vec<(String, RowPatch)> {
    let mut ret = vec![];

    for i in 0..count {
        let patch = RowPatch::new()
            .field("project_id", i as i64)
            .field("docs", format!("docs{}", i))
            .field("meta", serde_json::json!({ "iteration": i }));
        ret.push((format!("component{}", i), patch));
    }

    ret
}

fn build_table(dir: &std::path::Path) -> Table {
    let store = Store::open(dir.join("bench.sqlite")).unwrap();

    let mut builder = TableBuilder::new("components".into());
    builder.add_integer_field("project_id".into()).unwrap();
    builder.add_text_field("docs".into()).unwrap();
    builder.add_json_field("meta".into()).unwrap();
    store.bind(builder.build().unwrap()).unwrap()
}

pub fn upsert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("upsert");

    for count in [10usize, 100] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let tdir = tempfile::TempDir::new().unwrap();
            let table = build_table(tdir.path());
            let patches = build_patches(count);

            b.iter(|| {
                for (name, patch) in patches.iter() {
                    table.set(name, patch).unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, upsert_benchmark);
criterion_main!(benches);
