//! Configuration for the TKOIN settlement server
//!
//! Every value comes from an environment variable with a documented default.
//! A variable that is set but unparseable or out of range is a startup
//! error, never a silent fallback.

pub mod burn;
pub mod staking;
pub mod sweep;
pub mod webhook;

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

pub use burn::BurnSafetyConfig;
pub use staking::{SlashPercentages, StakingConfig, TierLimitTable};
pub use sweep::SweepConfig;
pub use webhook::WebhookConfig;

/// Read `key` from the environment, falling back to `default` when unset.
pub(crate) fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}")),
        _ => Ok(default),
    }
}

/// Process-level settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    /// Applied as `PRAGMA key` when non-empty
    pub db_encryption_key: String,
    pub bind_address: String,
    pub solana_rpc_url: String,
    pub tkoin_mint: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env_or("DATABASE_URL", "tkoin.db".to_string())?,
            db_encryption_key: env::var("DB_ENCRYPTION_KEY").unwrap_or_default(),
            bind_address: env_or("BIND_ADDRESS", "127.0.0.1:8080".to_string())?,
            solana_rpc_url: env_or(
                "SOLANA_RPC_URL",
                "https://api.mainnet-beta.solana.com".to_string(),
            )?,
            tkoin_mint: env::var("TKOIN_MINT").context("TKOIN_MINT must be set")?,
        })
    }
}

/// Business rules consumed by the settlement services
#[derive(Debug, Clone, Default)]
pub struct SettlementConfig {
    pub staking: StakingConfig,
    pub burn: BurnSafetyConfig,
    pub webhook: WebhookConfig,
    pub sweep: SweepConfig,
}

impl SettlementConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            staking: StakingConfig::from_env().context("Invalid staking configuration")?,
            burn: BurnSafetyConfig::from_env().context("Invalid burn safety configuration")?,
            webhook: WebhookConfig::from_env().context("Invalid webhook configuration")?,
            sweep: SweepConfig::from_env().context("Invalid sweep configuration")?,
        })
    }
}
