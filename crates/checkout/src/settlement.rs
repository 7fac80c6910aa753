//! The pay step: charge, then confirm or release the held stock.

use std::sync::Arc;
use std::time::Instant;

use common::{OrderId, UserId};
use domain::{Order, OrderStatus, Payment, PaymentStatus, TransactionId};
use serde::Serialize;
use store::{CheckoutStore, UnitOfWork};

use mockable::Clock;
use crate::error::{CheckoutError, Result};
use crate::hooks::{PostCommitHooks, abort};
use crate::ledger::{StockLedger, StockLine};
use crate::services::{Notifier, PaymentDecision, PaymentGateway};

/// A successfully paid order and its payment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub order: Order,
    pub payment: Payment,
}

/// How a settlement attempt resolved the order. Every variant commits.
enum Resolution {
    Paid(Settlement),
    Declined(TransactionId),
    Expired,
}

/// Executes payments against pending orders.
pub struct PaymentSettlement<S> {
    store: S,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl<S: CheckoutStore> PaymentSettlement<S> {
    pub fn new(
        store: S,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            clock,
        }
    }

    /// Pays for `order_id` on behalf of `user_id`.
    ///
    /// An expired hold or a declined charge still commits: the order is
    /// cancelled and its stock released before the error is returned. A
    /// gateway error rolls everything back and the order stays payable.
    #[tracing::instrument(skip_all, fields(%order_id, %user_id))]
    pub async fn pay(&self, order_id: OrderId, user_id: UserId) -> Result<Settlement> {
        let started = Instant::now();
        let mut hooks = PostCommitHooks::new();
        let mut tx = self.store.begin().await?;

        let resolution = match self.resolve(&mut tx, order_id, user_id, &mut hooks).await {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::info!(error = %e, "payment aborted");
                return Err(abort(tx, e).await);
            }
        };

        tx.commit().await?;
        hooks.run();
        metrics::histogram!("checkout_settlement_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match resolution {
            Resolution::Paid(settlement) => {
                metrics::counter!("checkout_payments_total", "status" => "success").increment(1);
                tracing::info!(
                    transaction_id = %settlement.payment.transaction_id,
                    amount = %settlement.payment.amount,
                    "order paid"
                );
                Ok(settlement)
            }
            Resolution::Declined(transaction_id) => {
                metrics::counter!("checkout_payments_total", "status" => "failed").increment(1);
                tracing::info!(%transaction_id, "payment declined, order cancelled");
                Err(CheckoutError::PaymentFailed {
                    order_id,
                    transaction_id,
                })
            }
            Resolution::Expired => {
                metrics::counter!("checkout_orders_expired_total", "trigger" => "payment")
                    .increment(1);
                tracing::info!("payment attempted after hold elapsed, order cancelled");
                Err(CheckoutError::OrderExpired(order_id))
            }
        }
    }

    async fn resolve(
        &self,
        tx: &mut S::Tx,
        order_id: OrderId,
        user_id: UserId,
        hooks: &mut PostCommitHooks,
    ) -> Result<Resolution> {
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        if !order.is_owned_by(user_id) {
            return Err(CheckoutError::Forbidden { order_id, user_id });
        }
        if !order.status().is_pending() {
            return Err(CheckoutError::InvalidState {
                status: order.status(),
                action: "pay",
            });
        }

        let lines = StockLine::from_items(order.items());

        if order.is_expired(self.clock.utc()) {
            StockLedger::release(tx, &lines).await?;
            order.cancel(self.clock.utc())?;
            tx.update_order_status(&order, OrderStatus::PendingPayment)
                .await?;
            return Ok(Resolution::Expired);
        }

        let decision = self.gateway.charge(&order).await?;
        let now = self.clock.utc();

        match decision {
            PaymentDecision::Declined(transaction_id) => {
                StockLedger::release(tx, &lines).await?;
                order.cancel(now)?;
                tx.update_order_status(&order, OrderStatus::PendingPayment)
                    .await?;
                let payment =
                    Payment::record(&order, transaction_id.clone(), PaymentStatus::Failed, now);
                tx.insert_payment(&payment).await?;
                Ok(Resolution::Declined(transaction_id))
            }
            PaymentDecision::Approved(transaction_id) => {
                StockLedger::confirm(tx, &lines).await?;
                order.mark_paid(now)?;
                tx.update_order_status(&order, OrderStatus::PendingPayment)
                    .await?;
                let payment = Payment::record(&order, transaction_id, PaymentStatus::Success, now);
                tx.insert_payment(&payment).await?;

                let notifier = Arc::clone(&self.notifier);
                let paid = order.clone();
                hooks.defer(move || dispatch_notification(notifier, paid));

                Ok(Resolution::Paid(Settlement { order, payment }))
            }
        }
    }
}

/// Sends the confirmation on its own task, outside any lock or
/// transaction.
fn dispatch_notification(notifier: Arc<dyn Notifier>, order: Order) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&order, order.user_id()).await {
            metrics::counter!("checkout_notifications_failed_total").increment(1);
            tracing::warn!(order_id = %order.id(), error = %e, "order confirmation not sent");
        }
    });
}
