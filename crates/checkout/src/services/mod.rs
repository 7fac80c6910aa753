//! Outbound collaborators of the engine and their in-process implementations.

pub mod notification;
pub mod payment;

pub use notification::{InMemoryNotifier, LogNotifier, NotificationError, Notifier};
pub use payment::{InMemoryPaymentGateway, PaymentDecision, PaymentGateway, SimulatedGateway};
