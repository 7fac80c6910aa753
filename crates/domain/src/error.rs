//! Domain error types.

use thiserror::Error;

use crate::order::{OrderStatus, ProductId};

/// Errors raised by the stock counters of a product.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    /// Not enough available units to satisfy a reservation.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// A release or confirm would drive a counter below zero.
    ///
    /// Callers only release or confirm what they reserved, so this is a
    /// broken invariant rather than a user-facing condition.
    #[error("Stock counter '{counter}' of {product_id} would underflow: holds {held}, asked to remove {requested}")]
    CounterUnderflow {
        product_id: ProductId,
        counter: &'static str,
        held: u32,
        requested: u32,
    },

    /// Quantities must be at least one unit.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },
}

/// Errors that can occur during order lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The order is not in a state that allows the requested transition.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderStatus,
        action: &'static str,
    },

    /// An order needs at least one line.
    #[error("Order has no items")]
    NoItems,

    /// A line total or the order total does not fit in the money type.
    #[error("Order total is out of range")]
    AmountOverflow,

    /// `now + hold` is not a representable timestamp.
    #[error("Hold duration is out of range")]
    HoldOutOfRange,
}
