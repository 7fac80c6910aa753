//! Expiry of unpaid orders.
//!
//! Two paths lead here. A per-order timer registered after the reservation
//! commits fires at `expires_at`; it lives only in this process. The
//! periodic sweep queries persisted `expires_at` values and is the path
//! that survives restarts. Both end in [`ExpirationReaper::expire_order`],
//! which re-checks the order under its row lock, so a timer and a sweep
//! racing each other (or a payment) resolve the order exactly once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::OrderStatus;
use serde::Serialize;
use store::{CheckoutStore, UnitOfWork};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use mockable::Clock;
use crate::error::Result;
use crate::hooks::abort;
use crate::ledger::{StockLedger, StockLine};

/// Registers a one-shot expiry check for an order.
pub trait ExpiryScheduler: Send + Sync {
    fn schedule(&self, order_id: OrderId, expires_at: DateTime<Utc>);
}

/// What started an expiry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryTrigger {
    Timer,
    Sweep,
}

impl ExpiryTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryTrigger::Timer => "timer",
            ExpiryTrigger::Sweep => "sweep",
        }
    }
}

/// Result of one expiry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// Stock released and order cancelled.
    Expired,
    /// The order was paid or cancelled before we got the lock.
    AlreadySettled,
    /// The hold has not elapsed yet.
    NotDue,
    NotFound,
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Cancels pending orders whose hold elapsed and releases their stock.
#[derive(Clone)]
pub struct ExpirationReaper<S> {
    store: S,
    clock: Arc<dyn Clock>,
    batch_size: usize,
}

impl<S: CheckoutStore> ExpirationReaper<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, batch_size: usize) -> Self {
        Self {
            store,
            clock,
            batch_size: batch_size.max(1),
        }
    }

    /// Expires a single order if it is still pending and due.
    #[tracing::instrument(skip_all, fields(%order_id, trigger = trigger.as_str()))]
    pub async fn expire_order(
        &self,
        order_id: OrderId,
        trigger: ExpiryTrigger,
    ) -> Result<ExpiryOutcome> {
        let mut tx = self.store.begin().await?;

        let outcome = match self.try_expire(&mut tx, order_id).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(abort(tx, e).await),
        };

        if outcome != ExpiryOutcome::Expired {
            tx.rollback().await?;
            tracing::debug!(?outcome, "order left untouched");
            return Ok(outcome);
        }

        tx.commit().await?;
        metrics::counter!("checkout_orders_expired_total", "trigger" => trigger.as_str())
            .increment(1);
        tracing::info!(%order_id, "order expired and stock released");
        Ok(outcome)
    }

    async fn try_expire(&self, tx: &mut S::Tx, order_id: OrderId) -> Result<ExpiryOutcome> {
        let Some(mut order) = tx.lock_order(order_id).await? else {
            return Ok(ExpiryOutcome::NotFound);
        };
        if order.status().is_settled() {
            return Ok(ExpiryOutcome::AlreadySettled);
        }

        let now = self.clock.utc();
        if !order.is_due_for_expiry(now) {
            return Ok(ExpiryOutcome::NotDue);
        }

        StockLedger::release(tx, &StockLine::from_items(order.items())).await?;
        order.cancel(now)?;
        tx.update_order_status(&order, OrderStatus::PendingPayment)
            .await?;
        Ok(ExpiryOutcome::Expired)
    }

    /// Expires up to one batch of due orders, earliest first.
    ///
    /// A failure on one order is logged and counted; the sweep carries on
    /// with the rest of the batch.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let due = self
            .store
            .find_expired_orders(self.clock.utc(), self.batch_size)
            .await?;

        let mut report = SweepReport {
            examined: due.len(),
            ..SweepReport::default()
        };
        for order_id in due {
            match self.expire_order(order_id, ExpiryTrigger::Sweep).await {
                Ok(ExpiryOutcome::Expired) => report.expired += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(%order_id, error = %e, "failed to expire order");
                }
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                expired = report.expired,
                failed = report.failed,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }
}

impl<S: CheckoutStore + Clone + 'static> ExpirationReaper<S> {
    /// Runs [`sweep`](Self::sweep) every `interval` until `shutdown` turns
    /// true or its sender is dropped.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let reaper = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = interval.as_secs_f64(), "expiry sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = reaper.sweep().await {
                            tracing::warn!(error = %e, "expiry sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("expiry sweeper stopped");
        })
    }
}

impl<S: CheckoutStore + Clone + 'static> ExpiryScheduler for ExpirationReaper<S> {
    fn schedule(&self, order_id: OrderId, expires_at: DateTime<Utc>) {
        let delay = (expires_at - self.clock.utc())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let reaper = self.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = reaper.expire_order(order_id, ExpiryTrigger::Timer).await {
                tracing::warn!(%order_id, error = %e, "expiry timer failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration as ChronoDuration;
    use common::UserId;
    use domain::{Money, Order, OrderItem, Product};
    use store::InMemoryStore;

    struct Fixture {
        store: InMemoryStore,
        clock: ManualClock,
        reaper: ExpirationReaper<InMemoryStore>,
    }

    fn fixture(batch_size: usize) -> Fixture {
        let store = InMemoryStore::new();
        let clock = ManualClock::default();
        let reaper = ExpirationReaper::new(store.clone(), Arc::new(clock.clone()), batch_size);
        Fixture {
            store,
            clock,
            reaper,
        }
    }

    /// Stores a pending order holding `quantity` units of SKU-001.
    async fn reserved_order(f: &Fixture, quantity: u32) -> Order {
        let now = f.clock.utc();
        let order = Order::place(
            UserId::new(),
            vec![OrderItem::new("SKU-001", quantity, Money::from_cents(1000))],
            now,
            ChronoDuration::minutes(15),
        )
        .unwrap();

        let mut tx = f.store.begin().await.unwrap();
        let mut product = tx
            .lock_product(&"SKU-001".into())
            .await
            .unwrap()
            .unwrap();
        product.reserve(quantity).unwrap();
        tx.update_product_stock(&product).await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();
        order
    }

    async fn seed_product(f: &Fixture, stock: u32) {
        f.store
            .put_product(&Product::new("SKU-001", "Widget", Money::from_cents(1000), stock))
            .await
            .unwrap();
    }

    async fn counters(f: &Fixture) -> (u32, u32) {
        let p = f.store.get_product(&"SKU-001".into()).await.unwrap().unwrap();
        (p.available_stock(), p.reserved_stock())
    }

    #[tokio::test]
    async fn test_expire_due_order_releases_stock() {
        let f = fixture(10);
        seed_product(&f, 10).await;
        let order = reserved_order(&f, 3).await;
        assert_eq!(counters(&f).await, (7, 3));

        f.clock.advance(ChronoDuration::minutes(16));
        let outcome = f
            .reaper
            .expire_order(order.id(), ExpiryTrigger::Sweep)
            .await
            .unwrap();

        assert_eq!(outcome, ExpiryOutcome::Expired);
        assert_eq!(counters(&f).await, (10, 0));
        let stored = f.store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_expire_is_idempotent() {
        let f = fixture(10);
        seed_product(&f, 10).await;
        let order = reserved_order(&f, 3).await;
        f.clock.advance(ChronoDuration::minutes(16));

        f.reaper
            .expire_order(order.id(), ExpiryTrigger::Timer)
            .await
            .unwrap();
        let second = f
            .reaper
            .expire_order(order.id(), ExpiryTrigger::Sweep)
            .await
            .unwrap();

        assert_eq!(second, ExpiryOutcome::AlreadySettled);
        assert_eq!(counters(&f).await, (10, 0));
    }

    #[tokio::test]
    async fn test_order_within_hold_is_not_due() {
        let f = fixture(10);
        seed_product(&f, 10).await;
        let order = reserved_order(&f, 1).await;

        f.clock.advance(ChronoDuration::minutes(14));
        let outcome = f
            .reaper
            .expire_order(order.id(), ExpiryTrigger::Timer)
            .await
            .unwrap();

        assert_eq!(outcome, ExpiryOutcome::NotDue);
        assert_eq!(counters(&f).await, (9, 1));
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let f = fixture(10);
        let outcome = f
            .reaper
            .expire_order(OrderId::new(), ExpiryTrigger::Sweep)
            .await
            .unwrap();
        assert_eq!(outcome, ExpiryOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_sweep_respects_batch_size() {
        let f = fixture(2);
        seed_product(&f, 10).await;
        for _ in 0..3 {
            reserved_order(&f, 1).await;
        }
        f.clock.advance(ChronoDuration::minutes(16));

        let first = f.reaper.sweep().await.unwrap();
        assert_eq!(first.examined, 2);
        assert_eq!(first.expired, 2);

        let second = f.reaper.sweep().await.unwrap();
        assert_eq!(second.expired, 1);
        assert_eq!(counters(&f).await, (10, 0));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let f = fixture(10);
        let (tx, rx) = watch::channel(false);

        let handle = f.reaper.spawn_sweeper(Duration::from_millis(10), rx);
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
