use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tablekv_core::{Owner, Query, Record, Store, StoreConfig};

#[derive(Debug, Default, Clone, Record)]
#[tkv(table_name = "balloons")]
struct Balloon {
    id: u32,
    color: String,
    size: i32,
}

const COLORS: [&str; 4] = ["WHITE", "RED", "BLUE", "GREEN"];

fn seeded(rows: usize) -> Store {
    let store = Store::open(StoreConfig::in_memory().with_sequence_bandwidth(256)).unwrap();
    for i in 0..rows {
        let mut b = Balloon {
            id: 0,
            color: COLORS[i % COLORS.len()].to_string(),
            size: i as i32,
        };
        store.save(&Owner::Root, &mut b).unwrap();
    }
    store
}

// ════════════════════════════════════════════
// Save
// ════════════════════════════════════════════

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("save");
    group.throughput(Throughput::Elements(1));

    for bandwidth in [1u64, 100] {
        group.bench_with_input(
            BenchmarkId::new("bandwidth", bandwidth),
            &bandwidth,
            |b, &bandwidth| {
                let store =
                    Store::open(StoreConfig::in_memory().with_sequence_bandwidth(bandwidth)).unwrap();
                b.iter(|| {
                    let mut balloon = Balloon {
                        id: 0,
                        color: "WHITE".to_string(),
                        size: 366,
                    };
                    black_box(store.save(&Owner::Root, &mut balloon).unwrap())
                });
            },
        );
    }

    group.finish();
}

// ════════════════════════════════════════════
// LoadAll / Query
// ════════════════════════════════════════════

fn bench_load_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_all");

    for rows in [100usize, 1_000, 10_000] {
        let store = seeded(rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| black_box(store.load_all::<Balloon>(&Owner::Root).unwrap()));
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let store = seeded(10_000);

    let by_color = Query::new().filter("color").eq(["RED"]);
    group.bench_function("color_eq", |b| {
        b.iter(|| black_box(by_color.run::<Balloon>(&store, &Owner::Root).unwrap()));
    });

    let conjunction = by_color.filter("size").eq([1i32, 5, 9, 13]);
    group.bench_function("color_and_size_eq", |b| {
        b.iter(|| black_box(conjunction.run::<Balloon>(&store, &Owner::Root).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_save, bench_load_all, bench_query);
criterion_main!(benches);
