//! Order confirmation notifications.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::Order;
use thiserror::Error;

/// A notification could not be delivered.
#[derive(Debug, Clone, Error)]
#[error("Notification failed: {0}")]
pub struct NotificationError(pub String);

/// Best-effort delivery of order confirmations.
///
/// The engine calls this after commit on a spawned task. A failure is
/// logged and counted; it never affects the order.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, order: &Order, user_id: UserId) -> Result<(), NotificationError>;
}

/// Writes the confirmation to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, order: &Order, user_id: UserId) -> Result<(), NotificationError> {
        tracing::info!(
            order_id = %order.id(),
            %user_id,
            total = %order.total_amount(),
            status = %order.status(),
            "order confirmation: thank you for your purchase, we will let you know when it ships"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<(OrderId, UserId)>,
    fail: bool,
}

/// Records notifications for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent notifications fail.
    pub fn set_fail(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail = fail;
    }

    /// Orders notified so far.
    pub fn sent(&self) -> Vec<(OrderId, UserId)> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }

    /// Polls until at least `count` notifications were delivered or
    /// `timeout` elapses. Returns whether the count was reached.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let poll = async {
            while self.sent().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, order: &Order, user_id: UserId) -> Result<(), NotificationError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail {
            return Err(NotificationError("mail relay unavailable".to_string()));
        }
        state.sent.push((order.id(), user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{Money, OrderItem};

    fn order() -> Order {
        Order::place(
            UserId::new(),
            vec![OrderItem::new("SKU-001", 1, Money::from_cents(1000))],
            Utc::now(),
            chrono::Duration::minutes(15),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_notifier_records_and_fails() {
        let notifier = InMemoryNotifier::new();
        let order = order();

        notifier.notify(&order, order.user_id()).await.unwrap();
        assert!(notifier.wait_for(1, Duration::from_millis(50)).await);

        notifier.set_fail(true);
        assert!(notifier.notify(&order, order.user_id()).await.is_err());
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let order = order();
        assert!(LogNotifier.notify(&order, order.user_id()).await.is_ok());
    }
}
