use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{Cart, Order, OrderStatus, Payment, Product, ProductId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    store::{CheckoutStore, UnitOfWork},
};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, Cart>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<OrderId, Payment>,
}

/// In-memory checkout store.
///
/// A unit of work holds the store-wide lock from `begin` until it is
/// committed, rolled back or dropped, so transactions are fully
/// serialized. Writes are applied in place and journaled; rollback replays
/// the journal backwards.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent commit fail (and roll back) until reset.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Returns the number of payments stored.
    pub async fn payment_count(&self) -> usize {
        self.tables.lock().await.payments.len()
    }
}

#[async_trait]
impl CheckoutStore for InMemoryStore {
    type Tx = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Tx> {
        let tables = Arc::clone(&self.tables).lock_owned().await;
        Ok(InMemoryUnitOfWork {
            tables,
            journal: Vec::new(),
            fail_on_commit: self.fail_on_commit.load(Ordering::SeqCst),
            finished: false,
        })
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.tables.lock().await.products.get(id).cloned())
    }

    async fn put_product(&self, product: &Product) -> Result<()> {
        self.tables
            .lock()
            .await
            .products
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.tables.lock().await.carts.get(&user_id).cloned())
    }

    async fn put_cart(&self, cart: &Cart) -> Result<()> {
        self.tables
            .lock()
            .await
            .carts
            .insert(cart.user_id, cart.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn get_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.tables.lock().await.payments.get(&order_id).cloned())
    }

    async fn find_expired_orders(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OrderId>> {
        let tables = self.tables.lock().await;
        let mut due: Vec<&Order> = tables
            .orders
            .values()
            .filter(|o| o.is_due_for_expiry(now))
            .collect();
        due.sort_by_key(|o| o.expires_at());
        Ok(due.into_iter().take(limit).map(Order::id).collect())
    }
}

/// Prior value of a row touched by a unit of work.
enum JournalEntry {
    Product(ProductId, Option<Product>),
    Cart(UserId, Option<Cart>),
    Order(OrderId, Option<Order>),
    Payment(OrderId, Option<Payment>),
}

/// Unit of work over [`InMemoryStore`].
pub struct InMemoryUnitOfWork {
    tables: OwnedMutexGuard<Tables>,
    journal: Vec<JournalEntry>,
    fail_on_commit: bool,
    finished: bool,
}

fn restore<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

impl InMemoryUnitOfWork {
    fn undo_all(&mut self) {
        let undone = self.journal.len();
        while let Some(entry) = self.journal.pop() {
            match entry {
                JournalEntry::Product(id, prior) => restore(&mut self.tables.products, id, prior),
                JournalEntry::Cart(id, prior) => restore(&mut self.tables.carts, id, prior),
                JournalEntry::Order(id, prior) => restore(&mut self.tables.orders, id, prior),
                JournalEntry::Payment(id, prior) => restore(&mut self.tables.payments, id, prior),
            }
        }
        self.finished = true;
        metrics::counter!("store_rollbacks_total", "backend" => "memory").increment(1);
        tracing::debug!(undone, "in-memory unit of work rolled back");
    }
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        if !self.finished {
            self.undo_all();
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_product(&mut self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.tables.products.get(id).cloned())
    }

    async fn update_product_stock(&mut self, product: &Product) -> Result<()> {
        let prior = self
            .tables
            .products
            .insert(product.id.clone(), product.clone());
        if prior.is_none() {
            self.tables.products.remove(&product.id);
            return Err(StoreError::not_found("product", &product.id));
        }
        self.journal
            .push(JournalEntry::Product(product.id.clone(), prior));
        Ok(())
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.tables.carts.get(&user_id).cloned())
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        let prior = self.tables.carts.insert(cart.user_id, cart.clone());
        self.journal.push(JournalEntry::Cart(cart.user_id, prior));
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.orders.get(&id).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.tables.orders.contains_key(&order.id()) {
            return Err(StoreError::conflict("order", order.id(), "already exists"));
        }
        self.tables.orders.insert(order.id(), order.clone());
        self.journal.push(JournalEntry::Order(order.id(), None));
        Ok(())
    }

    async fn update_order_status(&mut self, order: &Order, expected: OrderStatus) -> Result<()> {
        let current = self
            .tables
            .orders
            .get(&order.id())
            .map(Order::status)
            .ok_or_else(|| StoreError::not_found("order", order.id()))?;
        if current != expected {
            return Err(StoreError::conflict(
                "order",
                order.id(),
                format!("expected status {expected}, found {current}"),
            ));
        }
        let prior = self.tables.orders.insert(order.id(), order.clone());
        self.journal.push(JournalEntry::Order(order.id(), prior));
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        if self.tables.payments.contains_key(&payment.order_id) {
            return Err(StoreError::conflict(
                "payment",
                payment.order_id,
                "order already has a payment",
            ));
        }
        if self
            .tables
            .payments
            .values()
            .any(|p| p.transaction_id == payment.transaction_id)
        {
            return Err(StoreError::conflict(
                "payment",
                &payment.transaction_id,
                "duplicate transaction id",
            ));
        }
        self.tables
            .payments
            .insert(payment.order_id, payment.clone());
        self.journal
            .push(JournalEntry::Payment(payment.order_id, None));
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        if self.fail_on_commit {
            self.undo_all();
            return Err(StoreError::CommitFailed(
                "in-memory store configured to fail commits".to_string(),
            ));
        }
        self.journal.clear();
        self.finished = true;
        metrics::counter!("store_commits_total", "backend" => "memory").increment(1);
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        self.undo_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{Money, OrderItem, PaymentStatus, TransactionId};

    fn widget(stock: u32) -> Product {
        Product::new("SKU-001", "Widget", Money::from_cents(1000), stock)
    }

    fn pending_order(now: DateTime<Utc>) -> Order {
        Order::place(
            UserId::new(),
            vec![OrderItem::new("SKU-001", 1, Money::from_cents(1000))],
            now,
            Duration::minutes(15),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = InMemoryStore::new();
        store.put_product(&widget(5)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut product = tx.lock_product(&"SKU-001".into()).await.unwrap().unwrap();
        product.reserve(2).unwrap();
        tx.update_product_stock(&product).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.get_product(&"SKU-001".into()).await.unwrap().unwrap();
        assert_eq!(stored.available_stock(), 3);
        assert_eq!(stored.reserved_stock(), 2);
    }

    #[tokio::test]
    async fn test_rollback_restores_prior_state() {
        let store = InMemoryStore::new();
        store.put_product(&widget(5)).await.unwrap();
        let order = pending_order(Utc::now());

        let mut tx = store.begin().await.unwrap();
        let mut product = tx.lock_product(&"SKU-001".into()).await.unwrap().unwrap();
        product.reserve(5).unwrap();
        tx.update_product_stock(&product).await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.rollback().await.unwrap();

        let stored = store.get_product(&"SKU-001".into()).await.unwrap().unwrap();
        assert_eq!(stored.available_stock(), 5);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        store
            .put_cart(&Cart::new(user, vec![domain::CartItem::new("SKU-001", 1)]))
            .await
            .unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            let mut cart = tx.lock_cart(user).await.unwrap().unwrap();
            cart.clear(Utc::now());
            tx.save_cart(&cart).await.unwrap();
        }

        let cart = store.get_cart(user).await.unwrap().unwrap();
        assert_eq!(cart.items.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let store = InMemoryStore::new();
        store.set_fail_on_commit(true);
        let order = pending_order(Utc::now());

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        let result = tx.commit().await;

        assert!(matches!(result, Err(StoreError::CommitFailed(_))));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_conditional_status_update_detects_stale_state() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let order = pending_order(now);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();

        let mut paid = order.clone();
        paid.mark_paid(now).unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.update_order_status(&paid, OrderStatus::PendingPayment)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut cancelled = order.clone();
        cancelled.cancel(now).unwrap();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .update_order_status(&cancelled, OrderStatus::PendingPayment)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        drop(tx);

        let stored = store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_second_payment_for_order_conflicts() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let order = pending_order(now);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        let first = Payment::record(&order, TransactionId::new("TXN_1"), PaymentStatus::Failed, now);
        tx.insert_payment(&first).await.unwrap();
        let second = Payment::record(&order, TransactionId::new("TXN_2"), PaymentStatus::Success, now);
        assert!(tx.insert_payment(&second).await.unwrap_err().is_conflict());
        tx.commit().await.unwrap();

        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_find_expired_orders_skips_settled_and_future() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let expired = pending_order(now - Duration::minutes(30));
        let fresh = pending_order(now);
        let mut settled = pending_order(now - Duration::minutes(30));
        settled.cancel(now).unwrap();

        let mut tx = store.begin().await.unwrap();
        for order in [&expired, &fresh, &settled] {
            tx.insert_order(order).await.unwrap();
        }
        tx.commit().await.unwrap();

        let due = store.find_expired_orders(now, 10).await.unwrap();
        assert_eq!(due, vec![expired.id()]);
    }
}
