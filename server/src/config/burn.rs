//! Burn proposal safety limits

use anyhow::{ensure, Result};
use tkoin_types::TkoinAmount;

use super::env_or;

#[derive(Debug, Clone)]
pub struct BurnSafetyConfig {
    /// Share of the treasury balance proposed per burn (basis points)
    pub burn_rate_bps: u32,
    pub min_amount: TkoinAmount,
    pub max_amount: TkoinAmount,
    /// Largest single burn as a share of total supply (basis points)
    pub max_supply_bps: u32,
    /// Largest cumulative burn inside the rolling window (basis points of total supply)
    pub max_period_bps: u32,
    pub rate_window_days: i64,
}

impl Default for BurnSafetyConfig {
    fn default() -> Self {
        Self {
            burn_rate_bps: 100,
            min_amount: TkoinAmount(1_000 * tkoin_types::BASE_UNITS_PER_TOKEN),
            max_amount: TkoinAmount(1_000_000 * tkoin_types::BASE_UNITS_PER_TOKEN),
            max_supply_bps: 100,
            max_period_bps: 300,
            rate_window_days: 30,
        }
    }
}

impl BurnSafetyConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            burn_rate_bps: env_or("BURN_RATE_BPS", 100u32)?,
            min_amount: TkoinAmount::from_whole_tokens(env_or("BURN_MIN_TOKENS", 1_000i64)?)?,
            max_amount: TkoinAmount::from_whole_tokens(env_or("BURN_MAX_TOKENS", 1_000_000i64)?)?,
            max_supply_bps: env_or("BURN_MAX_SUPPLY_BPS", 100u32)?,
            max_period_bps: env_or("BURN_MAX_PERIOD_BPS", 300u32)?,
            rate_window_days: env_or("BURN_RATE_WINDOW_DAYS", 30i64)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.burn_rate_bps > 0 && self.burn_rate_bps <= 10_000,
            "burn rate must be within (0, 10000] bps"
        );
        ensure!(
            self.min_amount <= self.max_amount,
            "burn minimum must not exceed burn maximum"
        );
        ensure!(
            self.max_supply_bps <= self.max_period_bps,
            "per-proposal supply cap must not exceed the window cap"
        );
        ensure!(self.rate_window_days > 0, "rate window must be positive");
        Ok(())
    }
}
