use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{Cart, Order, OrderStatus, Payment, Product, ProductId};

use crate::Result;

/// Core trait for checkout storage backends.
///
/// Every multi-step mutation runs through a [`UnitOfWork`] obtained from
/// [`CheckoutStore::begin`]. The plain read methods see only committed state
/// and are meant for pass-through queries and the expiry sweep.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// The unit-of-work handle produced by this store.
    type Tx: UnitOfWork;

    /// Starts a new isolated unit of work.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Reads a product without locking it.
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a catalog product. This is the catalog
    /// collaborator's seam, not part of the reservation flow.
    async fn put_product(&self, product: &Product) -> Result<()>;

    /// Reads a user's cart.
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Inserts or replaces a cart. This is the cart collaborator's seam.
    async fn put_cart(&self, cart: &Cart) -> Result<()>;

    /// Reads an order.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Reads the payment recorded for an order, if any.
    async fn get_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Returns up to `limit` pending orders whose `expires_at <= now`,
    /// earliest first.
    async fn find_expired_orders(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OrderId>>;
}

/// An explicit transaction handle.
///
/// Rows read through `lock_*` stay locked against other units of work until
/// the handle is committed or rolled back. Dropping a handle without
/// committing rolls it back, so no exit path can leave half-applied writes.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Loads and locks a product row.
    async fn lock_product(&mut self, id: &ProductId) -> Result<Option<Product>>;

    /// Writes the stock counters of a previously locked product.
    async fn update_product_stock(&mut self, product: &Product) -> Result<()>;

    /// Loads and locks a user's cart.
    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Writes a cart.
    async fn save_cart(&mut self, cart: &Cart) -> Result<()>;

    /// Loads and locks an order row.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Inserts a new order. Fails with a conflict if the id exists.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Writes `order`'s status, but only if the stored status still equals
    /// `expected`. A mismatch is reported as a conflict.
    async fn update_order_status(&mut self, order: &Order, expected: OrderStatus) -> Result<()>;

    /// Inserts a payment. Fails with a conflict if the order already has a
    /// payment or the transaction id is taken.
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Makes every write of this unit of work visible atomically.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this unit of work.
    async fn rollback(self) -> Result<()>;
}
