//! Payment gateway trait, the simulated gateway and a scriptable test double.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use domain::{Order, TransactionId};
use rand::Rng;

use crate::error::CheckoutError;

/// Outcome of a charge the gateway reached a decision on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentDecision {
    Approved(TransactionId),
    Declined(TransactionId),
}

impl PaymentDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, PaymentDecision::Approved(_))
    }
}

/// Decision point for charging an order's total.
///
/// `Err` means no decision was reached (transport failure); the engine
/// then leaves the order untouched so the charge can be retried.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, order: &Order) -> Result<PaymentDecision, CheckoutError>;
}

const TXN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TXN_SUFFIX_LEN: usize = 9;

/// Builds a transaction id of the form `TXN_<unix millis>_<9 base36 chars>`.
pub fn generate_transaction_id() -> TransactionId {
    let mut rng = rand::rng();
    let suffix: String = (0..TXN_SUFFIX_LEN)
        .map(|_| TXN_ALPHABET[rng.random_range(0..TXN_ALPHABET.len())] as char)
        .collect();
    TransactionId::new(format!("TXN_{}_{}", Utc::now().timestamp_millis(), suffix))
}

/// Gateway that approves a fixed fraction of charges at random.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedGateway {
    success_rate: f64,
}

impl SimulatedGateway {
    /// Creates a gateway approving with probability `success_rate`,
    /// clamped to `[0, 1]`.
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    fn decide(&self) -> PaymentDecision {
        let transaction_id = generate_transaction_id();
        if rand::rng().random::<f64>() < self.success_rate {
            PaymentDecision::Approved(transaction_id)
        } else {
            PaymentDecision::Declined(transaction_id)
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, order: &Order) -> Result<PaymentDecision, CheckoutError> {
        let decision = self.decide();
        tracing::debug!(
            order_id = %order.id(),
            amount = %order.total_amount(),
            approved = decision.is_approved(),
            "simulated charge"
        );
        Ok(decision)
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    charges: usize,
    decline_on_charge: bool,
    error_on_charge: bool,
}

/// Deterministic gateway for testing. Approves unless told otherwise.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent charges come back declined.
    pub fn set_decline_on_charge(&self, decline: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .decline_on_charge = decline;
    }

    /// Makes subsequent charges fail without a decision.
    pub fn set_error_on_charge(&self, error: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .error_on_charge = error;
    }

    /// Returns the number of charges that reached a decision.
    pub fn charge_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .charges
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(&self, _order: &Order) -> Result<PaymentDecision, CheckoutError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.error_on_charge {
            return Err(CheckoutError::Gateway("gateway unreachable".to_string()));
        }

        state.charges += 1;
        let transaction_id = TransactionId::new(format!("TXN-{:04}", state.charges));
        if state.decline_on_charge {
            Ok(PaymentDecision::Declined(transaction_id))
        } else {
            Ok(PaymentDecision::Approved(transaction_id))
        }
    }
}
