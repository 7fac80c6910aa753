//! Demo catalog for running without a database.

use domain::{Money, Product};
use store::CheckoutStore;

/// `(sku, name, price in cents, stock)`
const DEMO_CATALOG: [(&str, &str, i64, u32); 4] = [
    ("SKU-KEYBOARD", "Mechanical Keyboard", 8999, 25),
    ("SKU-MOUSE", "Wireless Mouse", 2999, 50),
    ("SKU-MONITOR", "27\" Monitor", 24999, 5),
    ("SKU-CABLE", "USB-C Cable", 999, 200),
];

/// Inserts the demo products, replacing any with the same SKU.
pub async fn seed_demo_catalog<S: CheckoutStore>(store: &S) -> store::Result<usize> {
    for (sku, name, price, stock) in DEMO_CATALOG {
        store
            .put_product(&Product::new(sku, name, Money::from_cents(price), stock))
            .await?;
    }
    tracing::info!(products = DEMO_CATALOG.len(), "demo catalog seeded");
    Ok(DEMO_CATALOG.len())
}
