//! Identifier types shared by every crate in the checkout workspace.

pub mod types;

pub use types::{OrderId, PaymentId, UserId};
