//! Stock counter moves, always inside the caller's unit of work.
//!
//! The ledger never commits. A failure part-way through a multi-line
//! operation leaves earlier lines written to the unit of work, and the
//! caller's rollback undoes them.

use domain::{CartItem, OrderItem, ProductId, StockError};
use store::UnitOfWork;

use crate::error::{CheckoutError, Result};

/// One `(product, quantity)` pair handed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }

    /// Lines covering every item of an order.
    pub fn from_items(items: &[OrderItem]) -> Vec<StockLine> {
        items.iter().map(StockLine::from).collect()
    }
}

impl From<&CartItem> for StockLine {
    fn from(item: &CartItem) -> Self {
        Self::new(item.product_id.clone(), item.quantity)
    }
}

impl From<&OrderItem> for StockLine {
    fn from(item: &OrderItem) -> Self {
        Self::new(item.product_id.clone(), item.quantity)
    }
}

#[derive(Debug, Clone, Copy)]
enum Movement {
    Release,
    Confirm,
}

impl Movement {
    fn as_str(self) -> &'static str {
        match self {
            Movement::Release => "release",
            Movement::Confirm => "confirm",
        }
    }
}

/// Reserve, release and confirm over product stock counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockLedger;

impl StockLedger {
    /// Moves each line's quantity from available to reserved and prices it
    /// at the product's current price.
    ///
    /// Every quantity is validated before the first product is touched.
    /// Products are locked in product-id order; the returned items follow
    /// the order of `lines`.
    pub async fn reserve<U: UnitOfWork>(tx: &mut U, lines: &[StockLine]) -> Result<Vec<OrderItem>> {
        validate_quantities(lines)?;

        let mut priced = Vec::with_capacity(lines.len());
        for index in lock_sequence(lines) {
            let line = &lines[index];
            let mut product = tx
                .lock_product(&line.product_id)
                .await?
                .ok_or_else(|| CheckoutError::ProductNotFound(line.product_id.clone()))?;

            product.reserve(line.quantity).map_err(stock_error)?;
            tx.update_product_stock(&product).await?;

            priced.push((
                index,
                OrderItem::new(product.id.clone(), line.quantity, product.price),
            ));
        }

        priced.sort_by_key(|(index, _)| *index);
        Ok(priced.into_iter().map(|(_, item)| item).collect())
    }

    /// Moves each line's quantity from reserved back to available.
    pub async fn release<U: UnitOfWork>(tx: &mut U, lines: &[StockLine]) -> Result<()> {
        Self::settle(tx, lines, Movement::Release).await
    }

    /// Removes each line's quantity from reserved for good.
    pub async fn confirm<U: UnitOfWork>(tx: &mut U, lines: &[StockLine]) -> Result<()> {
        Self::settle(tx, lines, Movement::Confirm).await
    }

    async fn settle<U: UnitOfWork>(tx: &mut U, lines: &[StockLine], movement: Movement) -> Result<()> {
        validate_quantities(lines)?;

        for index in lock_sequence(lines) {
            let line = &lines[index];
            let mut product = tx
                .lock_product(&line.product_id)
                .await?
                .ok_or_else(|| CheckoutError::ProductNotFound(line.product_id.clone()))?;

            let moved = match movement {
                Movement::Release => product.release(line.quantity),
                Movement::Confirm => product.confirm(line.quantity),
            };
            moved.map_err(stock_error)?;
            tx.update_product_stock(&product).await?;

            tracing::debug!(
                product_id = %line.product_id,
                quantity = line.quantity,
                movement = movement.as_str(),
                "stock moved"
            );
        }
        Ok(())
    }
}

fn validate_quantities(lines: &[StockLine]) -> Result<()> {
    match lines.iter().find(|line| line.quantity == 0) {
        Some(line) => Err(CheckoutError::InvalidQuantity {
            product_id: line.product_id.clone(),
            quantity: line.quantity,
        }),
        None => Ok(()),
    }
}

/// Indices of `lines` sorted by product id. Every unit of work locks
/// products in this order.
fn lock_sequence(lines: &[StockLine]) -> Vec<usize> {
    let mut sequence: Vec<usize> = (0..lines.len()).collect();
    sequence.sort_by(|&a, &b| lines[a].product_id.cmp(&lines[b].product_id));
    sequence
}

fn stock_error(err: StockError) -> CheckoutError {
    if matches!(err, StockError::CounterUnderflow { .. }) {
        tracing::error!(error = %err, "stock ledger invariant violated");
    }
    err.into()
}
