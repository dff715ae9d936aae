use criterion::{Criterion, criterion_group, criterion_main};
use domain::SkuId;
use store::{InMemoryInventoryLedger, InventoryLedger};

fn bench_reserve_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("inventory/reserve_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = InMemoryInventoryLedger::new();
                ledger.set_stock("SKU-BENCH", 1_000_000).await;
                let sku = SkuId::new("SKU-BENCH");
                let reservation = ledger.reserve(&sku, 1).await.unwrap();
                ledger.release(&reservation).await.unwrap();
            });
        });
    });
}

fn bench_contended_reserve(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("inventory/contended_reserve_16", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = InMemoryInventoryLedger::new();
                ledger.set_stock("SKU-BENCH", 1_000_000).await;
                let sku = SkuId::new("SKU-BENCH");

                let handles: Vec<_> = (0..16)
                    .map(|_| {
                        let ledger = ledger.clone();
                        let sku = sku.clone();
                        tokio::spawn(async move { ledger.reserve(&sku, 1).await })
                    })
                    .collect();

                for handle in handles {
                    handle.await.unwrap().unwrap();
                }
            });
        });
    });
}

criterion_group!(benches, bench_reserve_release, bench_contended_reserve);
criterion_main!(benches);
