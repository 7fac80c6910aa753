use std::sync::Arc;

use checkout::{
    CheckoutConfig, CheckoutEngine, InMemoryNotifier, InMemoryPaymentGateway, StockLedger,
    StockLine,
};
use common::UserId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{CartItem, Money, Product};
use mockable::DefaultClock;
use store::{CheckoutStore, InMemoryStore, UnitOfWork};

const SKUS: [&str; 3] = ["SKU-001", "SKU-002", "SKU-003"];

async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    for sku in SKUS {
        store
            .put_product(&Product::new(sku, sku, Money::from_cents(1000), u32::MAX / 2))
            .await
            .unwrap();
    }
    store
}

fn engine(store: InMemoryStore) -> CheckoutEngine<InMemoryStore> {
    CheckoutEngine::new(
        store,
        Arc::new(InMemoryPaymentGateway::new()),
        Arc::new(InMemoryNotifier::new()),
        Arc::new(DefaultClock),
        CheckoutConfig {
            expiry_timers: false,
            ..CheckoutConfig::default()
        },
    )
}

fn bench_reserve_and_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = rt.block_on(seeded_store());
    let lines: Vec<StockLine> = SKUS.iter().map(|sku| StockLine::new(*sku, 2)).collect();

    c.bench_function("checkout/ledger_reserve_release_3_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut tx = store.begin().await.unwrap();
                StockLedger::reserve(&mut tx, &lines).await.unwrap();
                StockLedger::release(&mut tx, &lines).await.unwrap();
                tx.commit().await.unwrap();
            });
        });
    });
}

fn bench_checkout_then_pay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = engine(rt.block_on(seeded_store()));

    c.bench_function("checkout/cart_to_paid_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let user = UserId::new();
                let items = SKUS.iter().map(|sku| CartItem::new(*sku, 1)).collect();
                engine.replace_cart(user, items).await.unwrap();
                let order = engine.create_order_from_cart(user).await.unwrap();
                engine.pay(order.id(), user).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_reserve_and_release, bench_checkout_then_pay);
criterion_main!(benches);
