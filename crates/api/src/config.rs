//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration as StdDuration;

use checkout::CheckoutConfig;
use checkout::config::{
    DEFAULT_HOLD_DURATION_SECS, DEFAULT_PAYMENT_SUCCESS_RATE, DEFAULT_SWEEP_BATCH_SIZE,
    DEFAULT_SWEEP_INTERVAL_SECS,
};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset means the
///   in-memory store with a demo catalog
/// - `HOLD_DURATION_SECS`: reservation hold (default: `900`)
/// - `SWEEP_INTERVAL_SECS`: expiry sweep period (default: `30`)
/// - `SWEEP_BATCH_SIZE`: orders expired per sweep (default: `100`)
/// - `PAYMENT_SUCCESS_RATE`: simulated approval probability (default: `0.9`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub hold_duration_secs: i64,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
    pub payment_success_rate: f64,
}

/// Parses `key`, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            hold_duration_secs: env_or("HOLD_DURATION_SECS", defaults.hold_duration_secs),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            sweep_batch_size: env_or("SWEEP_BATCH_SIZE", defaults.sweep_batch_size),
            payment_success_rate: env_or("PAYMENT_SUCCESS_RATE", defaults.payment_success_rate),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Engine settings derived from this configuration.
    ///
    /// A hold too long to represent falls back to the default.
    pub fn checkout(&self) -> CheckoutConfig {
        let hold_duration = chrono::Duration::try_seconds(self.hold_duration_secs.max(1))
            .unwrap_or_else(|| {
                tracing::warn!(
                    hold_duration_secs = self.hold_duration_secs,
                    "hold duration out of range, using default"
                );
                chrono::Duration::seconds(DEFAULT_HOLD_DURATION_SECS)
            });

        CheckoutConfig {
            hold_duration,
            sweep_interval: StdDuration::from_secs(self.sweep_interval_secs.max(1)),
            sweep_batch_size: self.sweep_batch_size.max(1),
            payment_success_rate: self.payment_success_rate,
            ..CheckoutConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            hold_duration_secs: DEFAULT_HOLD_DURATION_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            payment_success_rate: DEFAULT_PAYMENT_SUCCESS_RATE,
        }
    }
}
