//! Engine tunables.

use std::time::Duration as StdDuration;

use chrono::Duration;

/// How long a reservation is held before it may be reaped.
pub const DEFAULT_HOLD_DURATION_SECS: i64 = 15 * 60;
/// Delay between two expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
/// Maximum orders expired per sweep.
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 100;
/// Probability that the simulated gateway approves a charge.
pub const DEFAULT_PAYMENT_SUCCESS_RATE: f64 = 0.9;

/// Checkout engine configuration.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Time between reservation and expiry of an unpaid order.
    pub hold_duration: Duration,
    /// Period of the background expiry sweep.
    pub sweep_interval: StdDuration,
    /// Upper bound on orders handled by one sweep. Leftovers are picked up
    /// by the next tick.
    pub sweep_batch_size: usize,
    /// Approval probability used by the simulated gateway.
    pub payment_success_rate: f64,
    /// Whether to arm an in-process timer per order. The sweep runs either
    /// way.
    pub expiry_timers: bool,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            hold_duration: Duration::seconds(DEFAULT_HOLD_DURATION_SECS),
            sweep_interval: StdDuration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            payment_success_rate: DEFAULT_PAYMENT_SUCCESS_RATE,
            expiry_timers: true,
        }
    }
}
