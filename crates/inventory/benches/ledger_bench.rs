use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Money, Product, StockLine};
use inventory::{InMemoryNotifier, LedgerConfig, MovementContext, StockLedger};
use store::{Datastore, InMemoryStore};

fn seeded_ledger(
    rt: &tokio::runtime::Runtime,
    products: usize,
) -> (StockLedger<InMemoryStore>, Vec<StockLine>) {
    let store = InMemoryStore::new();
    let mut lines = Vec::with_capacity(products);
    rt.block_on(async {
        for i in 0..products {
            let product = Product::new(
                format!("Product {i}"),
                format!("SKU-{i}"),
                Money::from_cents(1000),
            )
            .with_stock(i64::MAX / 4);
            lines.push(StockLine::new(product.id, 1));
            store.upsert_product(product).await.unwrap();
        }
    });
    let ledger = StockLedger::new(
        store,
        Arc::new(InMemoryNotifier::new()),
        LedgerConfig::default(),
    );
    (ledger, lines)
}

fn bench_check_availability(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (ledger, lines) = seeded_ledger(&rt, 10);

    c.bench_function("inventory/check_availability_10_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger.check_availability(&lines).await.unwrap();
            });
        });
    });
}

fn bench_deduct(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (ledger, lines) = seeded_ledger(&rt, 3);
    let ctx = MovementContext::new("order created").reference("bench");

    c.bench_function("inventory/deduct_3_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger.deduct(&lines, &ctx).await.unwrap();
            });
        });
    });
}

fn bench_deduct_and_restore(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (ledger, lines) = seeded_ledger(&rt, 3);
    let deduct_ctx = MovementContext::new("order created").reference("bench");
    let restore_ctx = MovementContext::new("order cancelled").reference("bench");

    c.bench_function("inventory/deduct_then_restore", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger.deduct(&lines, &deduct_ctx).await.unwrap();
                ledger.add(&lines, &restore_ctx).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_check_availability,
    bench_deduct,
    bench_deduct_and_restore
);
criterion_main!(benches);
