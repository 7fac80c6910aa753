//! Payment records produced by settlement.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::order::{Money, Order};

/// Identifier assigned by the payment gateway to one settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome recorded on a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(format!("Unknown payment status: {other}")),
        }
    }
}

/// One settlement attempt for an order. Written once, never updated.
///
/// At most one payment exists per order and transaction ids are unique;
/// stores enforce both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub transaction_id: TransactionId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Records the outcome of charging `order`'s total.
    pub fn record(
        order: &Order,
        transaction_id: TransactionId,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            order_id: order.id(),
            transaction_id,
            amount: order.total_amount(),
            status,
            created_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PaymentStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderItem;
    use chrono::Duration;
    use common::UserId;

    #[test]
    fn test_record_copies_order_total() {
        let now = Utc::now();
        let order = Order::place(
            UserId::new(),
            vec![OrderItem::new("SKU-001", 2, Money::from_cents(750))],
            now,
            Duration::minutes(15),
        )
        .unwrap();

        let payment = Payment::record(
            &order,
            TransactionId::new("TXN_1_abc"),
            PaymentStatus::Success,
            now,
        );

        assert_eq!(payment.order_id, order.id());
        assert_eq!(payment.amount.cents(), 1500);
        assert!(payment.is_success());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("FAILED".parse::<PaymentStatus>(), Ok(PaymentStatus::Failed));
        assert!("PENDING".parse::<PaymentStatus>().is_err());
    }
}
