//! Domain layer for the checkout engine.
//!
//! This crate provides the data model the reservation engine operates on:
//! - `Product` with its available/reserved stock counters
//! - `Cart` as handed over by the cart collaborator
//! - `Order` and the `OrderStatus` state machine
//! - `Payment` records produced by settlement

pub mod cart;
pub mod error;
pub mod order;
pub mod payment;
pub mod product;

pub use cart::{Cart, CartItem};
pub use common::{OrderId, PaymentId, UserId};
pub use error::{OrderError, StockError};
pub use order::{Money, Order, OrderItem, OrderParts, OrderStatus, ProductId, UnknownOrderStatus};
pub use payment::{Payment, PaymentStatus, TransactionId};
pub use product::Product;
