use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, UserId};
use domain::{
    Cart, CartItem, Money, Order, OrderItem, OrderParts, OrderStatus, Payment, PaymentStatus,
    Product, ProductId, TransactionId,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{CheckoutStore, UnitOfWork},
};

const PRODUCT_COLUMNS: &str = "id, name, price_cents, available_stock, reserved_stock";
const ORDER_COLUMNS: &str =
    "id, user_id, items, total_cents, status, expires_at, created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, order_id, transaction_id, amount_cents, status, created_at";

/// PostgreSQL-backed checkout store.
///
/// Units of work are database transactions; `lock_*` reads take row
/// locks with `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn stock_from_db(product_id: &str, column: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        StoreError::InvalidRow(format!("product {product_id}: {column} out of range ({value})"))
    })
}

fn row_to_product(row: PgRow) -> Result<Product> {
    let id: String = row.try_get("id")?;
    let available = stock_from_db(&id, "available_stock", row.try_get("available_stock")?)?;
    let reserved = stock_from_db(&id, "reserved_stock", row.try_get("reserved_stock")?)?;
    Ok(Product::with_counters(
        id,
        row.try_get::<String, _>("name")?,
        Money::from_cents(row.try_get("price_cents")?),
        available,
        reserved,
    ))
}

fn row_to_cart(row: PgRow) -> Result<Cart> {
    let Json(items): Json<Vec<CartItem>> = row.try_get("items")?;
    Ok(Cart {
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        items,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let Json(items): Json<Vec<OrderItem>> = row.try_get("items")?;
    let status: String = row.try_get("status")?;
    let status: OrderStatus = status
        .parse()
        .map_err(|e: domain::UnknownOrderStatus| StoreError::InvalidRow(e.to_string()))?;

    Ok(Order::restore(OrderParts {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        items,
        total_amount: Money::from_cents(row.try_get("total_cents")?),
        status,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    let status: String = row.try_get("status")?;
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        transaction_id: TransactionId::new(row.try_get::<String, _>("transaction_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        status: status.parse::<PaymentStatus>().map_err(StoreError::InvalidRow)?,
        created_at: row.try_get("created_at")?,
    })
}

/// Maps a unique-constraint violation to a conflict; everything else stays
/// a database error.
fn map_unique_violation(e: sqlx::Error, entity: &'static str, id: impl ToString) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        let constraint = db_err.constraint().unwrap_or("unique").to_string();
        return StoreError::conflict(entity, id, format!("violates {constraint}"));
    }
    StoreError::Database(e)
}

#[async_trait]
impl CheckoutStore for PostgresStore {
    type Tx = PostgresUnitOfWork;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(PostgresUnitOfWork { tx })
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_product)
            .transpose()
    }

    async fn put_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, available_stock, reserved_stock, updated_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                available_stock = EXCLUDED.available_stock,
                reserved_stock = EXCLUDED.reserved_stock,
                updated_at = now()
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i64::from(product.available_stock()))
        .bind(i64::from(product.reserved_stock()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        sqlx::query("SELECT user_id, items, updated_at FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_cart)
            .transpose()
    }

    async fn put_cart(&self, cart: &Cart) -> Result<()> {
        upsert_cart(&self.pool, cart).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_order)
            .transpose()
    }

    async fn get_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_payment)
        .transpose()
    }

    async fn find_expired_orders(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OrderId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM orders
            WHERE status = 'PENDING_PAYMENT' AND expires_at <= $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(OrderId::from_uuid).collect())
    }
}

async fn upsert_cart<'e, E>(executor: E, cart: &Cart) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO carts (user_id, items, updated_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id) DO UPDATE
        SET items = EXCLUDED.items, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(cart.user_id.as_uuid())
    .bind(Json(&cart.items))
    .bind(cart.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Unit of work over [`PostgresStore`], backed by one database transaction.
///
/// Dropping it without `commit` lets sqlx roll the transaction back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn lock_product(&mut self, id: &ProductId) -> Result<Option<Product>> {
        sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_product)
        .transpose()
    }

    async fn update_product_stock(&mut self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET available_stock = $2, reserved_stock = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_str())
        .bind(i64::from(product.available_stock()))
        .bind(i64::from(product.reserved_stock()))
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", &product.id));
        }
        Ok(())
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        sqlx::query("SELECT user_id, items, updated_at FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(row_to_cart)
            .transpose()
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        upsert_cart(&mut *self.tx, cart).await
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_order)
        .transpose()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, items, total_cents, status, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().as_uuid())
        .bind(Json(order.items()))
        .bind(order.total_amount().cents())
        .bind(order.status().as_str())
        .bind(order.expires_at())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_unique_violation(e, "order", order.id()))?;
        Ok(())
    }

    async fn update_order_status(&mut self, order: &Order, expected: OrderStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = $3
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.updated_at())
        .bind(expected.as_str())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::conflict(
                "order",
                order.id(),
                format!("status is no longer {expected}"),
            ));
        }
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, transaction_id, amount_cents, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.transaction_id.as_str())
        .bind(payment.amount.cents())
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_unique_violation(e, "payment", payment.order_id))?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        metrics::counter!("store_commits_total", "backend" => "postgres").increment(1);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        metrics::counter!("store_rollbacks_total", "backend" => "postgres").increment(1);
        Ok(())
    }
}
