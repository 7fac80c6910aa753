//! Post-payment status changes: shipping and delivery.

use std::sync::Arc;

use common::OrderId;
use domain::{Order, OrderStatus};
use store::{CheckoutStore, UnitOfWork};

use mockable::Clock;
use crate::error::{CheckoutError, Result};
use crate::hooks::abort;

/// Moves paid orders along `PAID -> SHIPPED -> DELIVERED`.
pub struct Fulfillment<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: CheckoutStore> Fulfillment<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Advances an order to `target`, which must be its direct successor on
    /// the fulfillment chain.
    #[tracing::instrument(skip(self))]
    pub async fn advance_status(&self, order_id: OrderId, target: OrderStatus) -> Result<Order> {
        let mut tx = self.store.begin().await?;

        let order = match self.advance(&mut tx, order_id, target).await {
            Ok(order) => order,
            Err(e) => return Err(abort(tx, e).await),
        };

        tx.commit().await?;
        tracing::info!(status = %order.status(), "order status advanced");
        Ok(order)
    }

    async fn advance(&self, tx: &mut S::Tx, order_id: OrderId, target: OrderStatus) -> Result<Order> {
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        let prior = order.status();
        order.fulfill(target, self.clock.utc())?;
        tx.update_order_status(&order, prior).await?;
        Ok(order)
    }
}
