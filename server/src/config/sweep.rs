//! Background sweep intervals

use anyhow::{ensure, Result};
use std::time::Duration;

use super::env_or;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub order_expiry_interval_secs: u64,
    pub nonce_cleanup_interval_secs: u64,
    /// Lifetime of a P2P order when the caller does not give one
    pub default_order_ttl_secs: i64,
    /// Upper bound on a caller-supplied order lifetime
    pub max_order_ttl_secs: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            order_expiry_interval_secs: 60,
            nonce_cleanup_interval_secs: 3_600,
            default_order_ttl_secs: 1_800,
            max_order_ttl_secs: 7 * 86_400,
        }
    }
}

impl SweepConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            order_expiry_interval_secs: env_or("ORDER_EXPIRY_INTERVAL_SECS", 60u64)?,
            nonce_cleanup_interval_secs: env_or("NONCE_CLEANUP_INTERVAL_SECS", 3_600u64)?,
            default_order_ttl_secs: env_or("ORDER_TTL_SECS", 1_800i64)?,
            max_order_ttl_secs: env_or("ORDER_MAX_TTL_SECS", 7 * 86_400i64)?,
        };
        ensure!(config.order_expiry_interval_secs > 0, "expiry interval must be positive");
        ensure!(config.nonce_cleanup_interval_secs > 0, "cleanup interval must be positive");
        ensure!(config.default_order_ttl_secs > 0, "order TTL must be positive");
        ensure!(
            config.max_order_ttl_secs >= config.default_order_ttl_secs,
            "max order TTL must not be below the default TTL"
        );
        Ok(config)
    }

    pub fn order_expiry_interval(&self) -> Duration {
        Duration::from_secs(self.order_expiry_interval_secs)
    }

    pub fn nonce_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.nonce_cleanup_interval_secs)
    }
}
