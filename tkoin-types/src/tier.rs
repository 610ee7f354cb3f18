//! Verification tiers
//!
//! Tiers are derived from an agent's staked amount through fixed, ordered
//! thresholds. Each tier carries the transaction limits written onto the
//! agent row whenever the tier is (re)computed.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::amount::TkoinAmount;
use crate::error::ParseEnumError;

/// Agent verification tier, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Basic,
    Verified,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::Verified => "verified",
            Tier::Premium => "premium",
        }
    }

    /// The tier directly above this one
    pub fn next(&self) -> Option<Tier> {
        match self {
            Tier::Basic => Some(Tier::Verified),
            Tier::Verified => Some(Tier::Premium),
            Tier::Premium => None,
        }
    }

    pub fn all() -> [Tier; 3] {
        [Tier::Basic, Tier::Verified, Tier::Premium]
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Tier::Basic),
            "verified" => Ok(Tier::Verified),
            "premium" => Ok(Tier::Premium),
            _ => Err(ParseEnumError::new("tier", s)),
        }
    }
}

/// Daily and monthly transaction limits (USD) granted by a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub daily_limit: i64,
    pub monthly_limit: i64,
}

/// Staked-amount boundaries between tiers.
///
/// `basic` below `verified`, `verified` below `premium`, `premium` at or above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThresholds {
    verified: TkoinAmount,
    premium: TkoinAmount,
}

impl TierThresholds {
    /// Build thresholds; they must be positive and strictly increasing.
    pub fn new(verified: TkoinAmount, premium: TkoinAmount) -> Result<Self, String> {
        if !verified.is_positive() {
            return Err("verified threshold must be positive".to_string());
        }
        if premium <= verified {
            return Err("premium threshold must exceed verified threshold".to_string());
        }
        Ok(Self { verified, premium })
    }

    /// Minimum staked amount for a tier
    pub fn threshold(&self, tier: Tier) -> TkoinAmount {
        match tier {
            Tier::Basic => TkoinAmount::ZERO,
            Tier::Verified => self.verified,
            Tier::Premium => self.premium,
        }
    }

    /// Tier earned by a staked amount. Monotonic in `staked`.
    pub fn tier_for(&self, staked: TkoinAmount) -> Tier {
        if staked >= self.premium {
            Tier::Premium
        } else if staked >= self.verified {
            Tier::Verified
        } else {
            Tier::Basic
        }
    }

    /// Next tier above the one earned by `staked`, with the distance to it
    pub fn next_tier(&self, staked: TkoinAmount) -> Option<(Tier, TkoinAmount)> {
        let next = self.tier_for(staked).next()?;
        Some((next, self.threshold(next).saturating_sub(staked)))
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            verified: TkoinAmount(10_000 * crate::amount::BASE_UNITS_PER_TOKEN),
            premium: TkoinAmount(50_000 * crate::amount::BASE_UNITS_PER_TOKEN),
        }
    }
}
