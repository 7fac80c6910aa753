//! Checkout error types.

use common::{OrderId, UserId};
use domain::{OrderError, OrderStatus, ProductId, StockError, TransactionId};
use store::StoreError;
use thiserror::Error;

/// Coarse classification of a [`CheckoutError`].
///
/// Transports map kinds (or individual variants) to their own codes; the
/// engine itself never deals in status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is malformed or refers to unknown things.
    Validation,
    /// Another actor got there first: stock ran out or the order moved on.
    Contention,
    /// The reservation hold elapsed.
    Temporal,
    /// The payment step failed.
    Downstream,
    /// The caller does not own the order.
    Authorization,
    /// Storage failure or a broken ledger invariant.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Contention => "contention",
            ErrorKind::Temporal => "temporal",
            ErrorKind::Downstream => "downstream",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors returned by checkout operations.
///
/// Whatever the variant, the unit of work that produced it was rolled back
/// unless the variant says otherwise: `OrderExpired` and `PaymentFailed`
/// are reported after the cancellation they caused was committed.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The user has no cart or the cart has no items.
    #[error("Cart is empty")]
    EmptyCart,

    /// Not enough units available to reserve a cart line.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// A cart line refers to a product the catalog does not know.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A cart line asks for zero units.
    #[error("Invalid quantity for {product_id}: {quantity}")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// The priced cart adds up to more than an order can hold.
    #[error("Order total is out of range")]
    AmountOverflow,

    /// The configured hold pushes `expires_at` past the representable range.
    #[error("Hold duration is out of range")]
    HoldOutOfRange,

    /// No order with this id exists.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order belongs to another user.
    #[error("User {user_id} may not access order {order_id}")]
    Forbidden { order_id: OrderId, user_id: UserId },

    /// The order's status does not allow the requested action.
    #[error("Cannot {action} an order in {status} state")]
    InvalidState {
        status: OrderStatus,
        action: &'static str,
    },

    /// The hold elapsed before payment; the order was cancelled and its
    /// stock released.
    #[error("Order {0} has expired")]
    OrderExpired(OrderId),

    /// The gateway declined the charge; the order was cancelled and a
    /// failed payment recorded.
    #[error("Payment declined for order {order_id} (transaction {transaction_id})")]
    PaymentFailed {
        order_id: OrderId,
        transaction_id: TransactionId,
    },

    /// The gateway could not be reached or gave no decision.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// A stock counter invariant was violated.
    #[error("Stock ledger invariant violated: {0}")]
    Ledger(StockError),

    /// Storage error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::EmptyCart
            | CheckoutError::ProductNotFound(_)
            | CheckoutError::InvalidQuantity { .. }
            | CheckoutError::AmountOverflow
            | CheckoutError::OrderNotFound(_) => ErrorKind::Validation,
            CheckoutError::InsufficientStock { .. } | CheckoutError::InvalidState { .. } => {
                ErrorKind::Contention
            }
            CheckoutError::OrderExpired(_) => ErrorKind::Temporal,
            CheckoutError::PaymentFailed { .. } | CheckoutError::Gateway(_) => {
                ErrorKind::Downstream
            }
            CheckoutError::Forbidden { .. } => ErrorKind::Authorization,
            CheckoutError::Store(e) if e.is_conflict() => ErrorKind::Contention,
            CheckoutError::HoldOutOfRange
            | CheckoutError::Ledger(_)
            | CheckoutError::Store(_) => ErrorKind::Internal,
        }
    }
}

impl From<StockError> for CheckoutError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::InsufficientStock {
                product_id,
                available,
                requested,
            } => CheckoutError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            StockError::InvalidQuantity {
                product_id,
                quantity,
            } => CheckoutError::InvalidQuantity {
                product_id,
                quantity,
            },
            err @ StockError::CounterUnderflow { .. } => CheckoutError::Ledger(err),
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidStateTransition {
                current_state,
                action,
            } => CheckoutError::InvalidState {
                status: current_state,
                action,
            },
            OrderError::NoItems => CheckoutError::EmptyCart,
            OrderError::AmountOverflow => CheckoutError::AmountOverflow,
            OrderError::HoldOutOfRange => CheckoutError::HoldOutOfRange,
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
