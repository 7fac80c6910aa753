//! Turns a cart into a pending order with its stock held.

use std::sync::Arc;

use chrono::Duration;
use common::UserId;
use domain::Order;
use store::{CheckoutStore, UnitOfWork};

use mockable::Clock;
use crate::error::{CheckoutError, Result};
use crate::hooks::{PostCommitHooks, abort};
use crate::ledger::{StockLedger, StockLine};
use crate::reaper::ExpiryScheduler;

/// Reserves a cart's stock and creates the order in one unit of work.
pub struct ReservationCoordinator<S> {
    store: S,
    clock: Arc<dyn Clock>,
    hold: Duration,
    scheduler: Option<Arc<dyn ExpiryScheduler>>,
}

impl<S: CheckoutStore> ReservationCoordinator<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, hold: Duration) -> Self {
        Self {
            store,
            clock,
            hold,
            scheduler: None,
        }
    }

    /// Registers an expiry timer for every order once its reservation has
    /// committed.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn ExpiryScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Creates a `PendingPayment` order from the user's cart.
    ///
    /// Locks the cart, reserves every line, snapshots prices, inserts the
    /// order and clears the cart. Either all of that commits or none of it
    /// does: on any error the cart and stock are exactly as before.
    #[tracing::instrument(skip_all, fields(%user_id))]
    pub async fn create_order_from_cart(&self, user_id: UserId) -> Result<Order> {
        let mut hooks = PostCommitHooks::new();
        let mut tx = self.store.begin().await?;

        let order = match self.reserve(&mut tx, user_id, &mut hooks).await {
            Ok(order) => order,
            Err(e) => {
                metrics::counter!(
                    "checkout_reservations_rejected_total",
                    "kind" => e.kind().as_str()
                )
                .increment(1);
                tracing::info!(error = %e, "checkout rejected");
                return Err(abort(tx, e).await);
            }
        };

        tx.commit().await?;
        hooks.run();

        metrics::counter!("checkout_orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id(),
            total = %order.total_amount(),
            expires_at = %order.expires_at(),
            "order reserved"
        );
        Ok(order)
    }

    async fn reserve(
        &self,
        tx: &mut S::Tx,
        user_id: UserId,
        hooks: &mut PostCommitHooks,
    ) -> Result<Order> {
        let mut cart = tx
            .lock_cart(user_id)
            .await?
            .filter(|cart| !cart.is_empty())
            .ok_or(CheckoutError::EmptyCart)?;

        let lines: Vec<StockLine> = cart.items.iter().map(StockLine::from).collect();
        let items = StockLedger::reserve(tx, &lines).await?;

        let now = self.clock.utc();
        let order = Order::place(user_id, items, now, self.hold)?;
        tx.insert_order(&order).await?;

        cart.clear(now);
        tx.save_cart(&cart).await?;

        if let Some(scheduler) = &self.scheduler {
            let scheduler = Arc::clone(scheduler);
            let (order_id, expires_at) = (order.id(), order.expires_at());
            hooks.defer(move || scheduler.schedule(order_id, expires_at));
        }

        Ok(order)
    }
}
