use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use entmut::{
    client::{Client, MutationBuilder},
    context::Context,
    persist::{Driver, sqlite::SqliteDriver},
    schema::{EntityDescriptor, FieldDescriptor, Registry},
    spec::{Direction, predicate},
};

fn client() -> Client {
    let registry = Arc::new(
        Registry::builder()
            .entity(
                EntityDescriptor::new("Item", "items")
                    .field(FieldDescriptor::string("name").unique())
                    .field(FieldDescriptor::int("rank").default_value(0i64)),
            )
            .build()
            .expect("registry"),
    );
    let driver = SqliteDriver::open_in_memory().expect("open");
    driver.create_schema(&registry).expect("schema");
    let driver: Arc<dyn Driver> = Arc::new(driver);
    Client::builder(registry, driver).build().expect("client")
}

fn bench_single_creates(c: &mut Criterion) {
    let ctx = Context::background();
    c.bench_function("create_one_1k", |b| {
        b.iter(|| {
            let items = client().entity("Item").expect("entity");
            for i in 0..1_000i64 {
                items
                    .create()
                    .set("name", format!("item-{i}"))
                    .set("rank", i)
                    .exec(&ctx)
                    .expect("create");
            }
        });
    });
}

fn bench_bulk_creates(c: &mut Criterion) {
    let ctx = Context::background();
    let mut group = c.benchmark_group("create_bulk");
    for size in [10usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let items = client().entity("Item").expect("entity");
                items
                    .create_bulk((0..size).map(|i| items.create().set("name", format!("item-{i}"))))
                    .exec(&ctx)
                    .expect("bulk");
            });
        });
    }
    group.finish();
}

fn bench_update_and_query(c: &mut Criterion) {
    let ctx = Context::background();
    let items = client().entity("Item").expect("entity");
    let mut created = Vec::new();
    for chunk in 0..10i64 {
        let rows = (chunk * 500..(chunk + 1) * 500).map(|i| {
            items
                .create()
                .set("name", format!("item-{i}"))
                .set("rank", i % 97)
        });
        created.extend(items.create_bulk(rows).save(&ctx).expect("seed"));
    }

    c.bench_function("update_one_by_id", |b| {
        let mut i = 0i64;
        b.iter(|| {
            let target = &created[(i as usize) % created.len()];
            items
                .update_one(target)
                .set("rank", i)
                .exec(&ctx)
                .expect("update");
            i += 1;
        });
    });

    c.bench_function("query_ranked_page", |b| {
        b.iter(|| {
            items
                .query()
                .where_(predicate::lt("rank", 10i64))
                .order_by("name", Direction::Asc)
                .limit(50)
                .all(&ctx)
                .expect("query")
        });
    });
}

criterion_group!(
    benches,
    bench_single_creates,
    bench_bulk_creates,
    bench_update_and_query
);
criterion_main!(benches);
