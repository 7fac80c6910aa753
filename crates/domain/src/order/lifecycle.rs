//! The order record and its lifecycle transitions.

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderItem, OrderStatus};
use crate::error::OrderError;

/// An order created from a cart.
///
/// Items, total and expiry are fixed at creation; only the status moves,
/// and only forward along [`OrderStatus::can_transition_to`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    items: Vec<OrderItem>,
    total_amount: Money,
    status: OrderStatus,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Raw column values used by stores to rebuild an [`Order`].
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order in `PendingPayment` holding `items` until
    /// `now + hold`.
    pub fn place(
        user_id: UserId,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
        hold: Duration,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let total_amount = items
            .iter()
            .try_fold(Money::zero(), |total, item| {
                item.line_total().and_then(|line| total.checked_add(line))
            })
            .ok_or(OrderError::AmountOverflow)?;
        let expires_at = now
            .checked_add_signed(hold)
            .ok_or(OrderError::HoldOutOfRange)?;

        Ok(Self {
            id: OrderId::new(),
            user_id,
            items,
            total_amount,
            status: OrderStatus::PendingPayment,
            expires_at,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds an order from persisted state.
    pub fn restore(parts: OrderParts) -> Self {
        Self {
            id: parts.id,
            user_id: parts.user_id,
            items: parts.items,
            total_amount: parts.total_amount,
            status: parts.status,
            expires_at: parts.expires_at,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if `user_id` owns this order.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Returns true once the hold has strictly elapsed, at which point
    /// payment is no longer accepted.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Returns true if the reaper should cancel this order at `now`.
    pub fn is_due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status.is_pending() && self.expires_at <= now
    }

    /// Marks the order paid after its reserved stock was confirmed.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.advance_to(OrderStatus::Paid, "mark paid", now)
    }

    /// Cancels the order after its reserved stock was released.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.advance_to(OrderStatus::Cancelled, "cancel", now)
    }

    /// Moves a paid order along the fulfillment chain.
    pub fn fulfill(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !matches!(next, OrderStatus::Shipped | OrderStatus::Delivered) {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.status,
                action: "fulfill",
            });
        }
        self.advance_to(next, "fulfill", now)
    }

    fn advance_to(
        &mut self,
        next: OrderStatus,
        action: &'static str,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.status,
                action,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
