//! Webhook protocol timing and retry parameters

use anyhow::{ensure, Result};
use std::time::Duration;

use super::env_or;

/// Accepted clock skew for inbound `X-Timestamp` (5 minutes)
pub const DEFAULT_FRESHNESS_WINDOW_SECS: i64 = 300;

/// How long a consumed nonce is remembered
pub const DEFAULT_NONCE_RETENTION_SECS: i64 = 86_400;

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub freshness_window_secs: i64,
    pub nonce_retention_secs: i64,
    /// Timeout for verification-type calls
    pub verification_timeout: Duration,
    /// Timeout for settlement-type calls
    pub settlement_timeout: Duration,
    pub max_attempts: u32,
    /// Base delay between attempts; doubled after each failure
    pub retry_backoff: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: DEFAULT_FRESHNESS_WINDOW_SECS,
            nonce_retention_secs: DEFAULT_NONCE_RETENTION_SECS,
            verification_timeout: Duration::from_secs(30),
            settlement_timeout: Duration::from_secs(60),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

impl WebhookConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            freshness_window_secs: env_or(
                "WEBHOOK_FRESHNESS_WINDOW_SECS",
                DEFAULT_FRESHNESS_WINDOW_SECS,
            )?,
            nonce_retention_secs: env_or(
                "WEBHOOK_NONCE_RETENTION_SECS",
                DEFAULT_NONCE_RETENTION_SECS,
            )?,
            verification_timeout: Duration::from_secs(env_or(
                "WEBHOOK_VERIFICATION_TIMEOUT_SECS",
                30u64,
            )?),
            settlement_timeout: Duration::from_secs(env_or(
                "WEBHOOK_SETTLEMENT_TIMEOUT_SECS",
                60u64,
            )?),
            max_attempts: env_or("WEBHOOK_MAX_ATTEMPTS", 3u32)?,
            retry_backoff: Duration::from_millis(env_or("WEBHOOK_RETRY_BACKOFF_MS", 2_000u64)?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.freshness_window_secs > 0, "freshness window must be positive");
        // A nonce must outlive every timestamp that could still pass the freshness check
        ensure!(
            self.nonce_retention_secs >= 2 * self.freshness_window_secs,
            "nonce retention must be at least twice the freshness window"
        );
        ensure!(
            (1..=10).contains(&self.max_attempts),
            "webhook attempts must be between 1 and 10"
        );
        Ok(())
    }
}
