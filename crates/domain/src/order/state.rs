//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
///                    ┌──► Paid ──► Shipped ──► Delivered
/// PendingPayment ────┤
///                    └──► Cancelled
/// ```
///
/// `PendingPayment` is the only status from which reserved stock can still
/// be released or confirmed. `Paid` and `Cancelled` are the two mutually
/// exclusive outcomes of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Stock is reserved and the hold timer is running.
    PendingPayment,

    /// Payment succeeded; reserved stock was confirmed as sold.
    Paid,

    /// Payment failed or the hold expired; reserved stock was released.
    Cancelled,

    /// Handed to fulfillment.
    Shipped,

    /// Received by the customer (terminal state).
    Delivered,
}

impl OrderStatus {
    /// Returns true while the reservation is still open.
    pub fn is_pending(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Returns true once the reservation has been resolved either way.
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Returns true if `next` is a legal direct successor of this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::PendingPayment, OrderStatus::Paid)
                | (OrderStatus::PendingPayment, OrderStatus::Cancelled)
                | (OrderStatus::Paid, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
        )
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Delivered)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownOrderStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownOrderStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(OrderStatus::PendingPayment),
            "PAID" => Ok(OrderStatus::Paid),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            other => Err(UnknownOrderStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::PendingPayment,
        OrderStatus::Paid,
        OrderStatus::Cancelled,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ];

    #[test]
    fn test_only_pending_can_settle() {
        for status in ALL {
            let settles = status.can_transition_to(OrderStatus::Paid)
                || status.can_transition_to(OrderStatus::Cancelled);
            assert_eq!(settles, status == OrderStatus::PendingPayment, "{status}");
        }
    }

    #[test]
    fn test_fulfillment_chain() {
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::PendingPayment.can_transition_to(OrderStatus::Shipped));
    }

    #[test]
    fn test_no_transition_back_to_pending() {
        for status in ALL {
            assert!(!status.can_transition_to(OrderStatus::PendingPayment));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::PendingPayment.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
    }

    #[test]
    fn test_parse_matches_display() {
        for status in ALL {
            assert_eq!(status.to_string().parse::<OrderStatus>(), Ok(status));
        }
        assert!("REFUNDED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serialization_uses_screaming_case() {
        let json = serde_json::to_string(&OrderStatus::PendingPayment).unwrap();
        assert_eq!(json, "\"PENDING_PAYMENT\"");
    }
}
