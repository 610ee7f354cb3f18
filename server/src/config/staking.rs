//! Staking, tier and slashing parameters

use anyhow::{ensure, Result};
use tkoin_types::{SlashSeverity, Tier, TierLimits, TierThresholds, TkoinAmount};

use super::env_or;

/// Default minimum stake (tokens)
pub const DEFAULT_MIN_STAKE_TOKENS: i64 = 1_000;

/// Default lockup after each stake (days)
pub const DEFAULT_LOCKUP_DAYS: i64 = 30;

/// Default penalty on a forced unstake inside the lockup window (percent)
pub const DEFAULT_EARLY_UNSTAKE_PENALTY_PCT: u32 = 10;

/// Limits granted per tier, in USD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimitTable {
    pub basic: TierLimits,
    pub verified: TierLimits,
    pub premium: TierLimits,
}

impl TierLimitTable {
    pub fn limits_for(&self, tier: Tier) -> TierLimits {
        match tier {
            Tier::Basic => self.basic,
            Tier::Verified => self.verified,
            Tier::Premium => self.premium,
        }
    }
}

impl Default for TierLimitTable {
    fn default() -> Self {
        Self {
            basic: TierLimits {
                daily_limit: 1_000,
                monthly_limit: 10_000,
            },
            verified: TierLimits {
                daily_limit: 10_000,
                monthly_limit: 100_000,
            },
            premium: TierLimits {
                daily_limit: 50_000,
                monthly_limit: 500_000,
            },
        }
    }
}

/// Share of the current stake removed by an executed slash, per severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlashPercentages {
    pub minor: u32,
    pub major: u32,
    pub critical: u32,
}

impl SlashPercentages {
    pub fn for_severity(&self, severity: SlashSeverity) -> u32 {
        match severity {
            SlashSeverity::Minor => self.minor,
            SlashSeverity::Major => self.major,
            SlashSeverity::Critical => self.critical,
        }
    }
}

impl Default for SlashPercentages {
    fn default() -> Self {
        Self {
            minor: 10,
            major: 25,
            critical: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StakingConfig {
    pub min_stake: TkoinAmount,
    pub lockup_days: i64,
    pub early_unstake_penalty_pct: u32,
    pub thresholds: TierThresholds,
    pub limits: TierLimitTable,
    pub slash_pct: SlashPercentages,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            min_stake: TkoinAmount(DEFAULT_MIN_STAKE_TOKENS * tkoin_types::BASE_UNITS_PER_TOKEN),
            lockup_days: DEFAULT_LOCKUP_DAYS,
            early_unstake_penalty_pct: DEFAULT_EARLY_UNSTAKE_PENALTY_PCT,
            thresholds: TierThresholds::default(),
            limits: TierLimitTable::default(),
            slash_pct: SlashPercentages::default(),
        }
    }
}

impl StakingConfig {
    pub fn from_env() -> Result<Self> {
        let min_stake = env_or("MIN_STAKE_TOKENS", DEFAULT_MIN_STAKE_TOKENS)?;
        let verified = env_or("TIER_VERIFIED_THRESHOLD", 10_000i64)?;
        let premium = env_or("TIER_PREMIUM_THRESHOLD", 50_000i64)?;
        let defaults = TierLimitTable::default();

        let config = Self {
            min_stake: TkoinAmount::from_whole_tokens(min_stake)?,
            lockup_days: env_or("STAKE_LOCKUP_DAYS", DEFAULT_LOCKUP_DAYS)?,
            early_unstake_penalty_pct: env_or(
                "EARLY_UNSTAKE_PENALTY_PCT",
                DEFAULT_EARLY_UNSTAKE_PENALTY_PCT,
            )?,
            thresholds: TierThresholds::new(
                TkoinAmount::from_whole_tokens(verified)?,
                TkoinAmount::from_whole_tokens(premium)?,
            )
            .map_err(anyhow::Error::msg)?,
            limits: TierLimitTable {
                basic: TierLimits {
                    daily_limit: env_or("BASIC_DAILY_LIMIT", defaults.basic.daily_limit)?,
                    monthly_limit: env_or("BASIC_MONTHLY_LIMIT", defaults.basic.monthly_limit)?,
                },
                verified: TierLimits {
                    daily_limit: env_or("VERIFIED_DAILY_LIMIT", defaults.verified.daily_limit)?,
                    monthly_limit: env_or(
                        "VERIFIED_MONTHLY_LIMIT",
                        defaults.verified.monthly_limit,
                    )?,
                },
                premium: TierLimits {
                    daily_limit: env_or("PREMIUM_DAILY_LIMIT", defaults.premium.daily_limit)?,
                    monthly_limit: env_or(
                        "PREMIUM_MONTHLY_LIMIT",
                        defaults.premium.monthly_limit,
                    )?,
                },
            },
            slash_pct: SlashPercentages {
                minor: env_or("SLASH_MINOR_PCT", 10u32)?,
                major: env_or("SLASH_MAJOR_PCT", 25u32)?,
                critical: env_or("SLASH_CRITICAL_PCT", 50u32)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.min_stake.is_positive(), "minimum stake must be positive");
        ensure!(self.lockup_days >= 0, "lockup days must not be negative");
        ensure!(
            self.early_unstake_penalty_pct <= 100,
            "early unstake penalty must be at most 100%"
        );
        ensure!(
            self.slash_pct.minor <= self.slash_pct.major
                && self.slash_pct.major <= self.slash_pct.critical
                && self.slash_pct.critical <= 100,
            "slash percentages must be ordered minor <= major <= critical <= 100"
        );
        for tier in Tier::all() {
            let limits = self.limits.limits_for(tier);
            ensure!(
                limits.daily_limit > 0 && limits.daily_limit <= limits.monthly_limit,
                "{tier} limits must satisfy 0 < daily <= monthly"
            );
        }
        Ok(())
    }
}
