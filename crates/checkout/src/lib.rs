//! Checkout engine: inventory reservation and order settlement.
//!
//! A cart becomes a `PendingPayment` order whose stock is moved from
//! available to reserved. The reservation then resolves exactly once:
//! - payment succeeds: reserved stock is confirmed (sold), order is `Paid`
//! - payment is declined or the hold elapses: reserved stock is released,
//!   order is `Cancelled`
//!
//! Every step runs in one store unit of work, and side effects (expiry
//! timers, confirmation notifications) only fire after it commits.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fulfillment;
pub mod hooks;
pub mod ledger;
pub mod reaper;
pub mod reservation;
pub mod services;
pub mod settlement;

pub use clock::ManualClock;
pub use config::CheckoutConfig;
pub use engine::{CheckoutEngine, OrderDetails};
pub use error::{CheckoutError, ErrorKind, Result};
pub use fulfillment::Fulfillment;
pub use hooks::PostCommitHooks;
pub use ledger::{StockLedger, StockLine};
pub use reaper::{ExpirationReaper, ExpiryOutcome, ExpiryScheduler, ExpiryTrigger, SweepReport};
pub use reservation::ReservationCoordinator;
pub use services::{
    InMemoryNotifier, InMemoryPaymentGateway, LogNotifier, NotificationError, Notifier,
    PaymentDecision, PaymentGateway, SimulatedGateway,
};
pub use settlement::{PaymentSettlement, Settlement};
