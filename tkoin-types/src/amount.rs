//! TKOIN amount handling
//!
//! All ledger arithmetic happens in base units (1 TKOIN = 10^9 base units).
//! Floating point is only used at the edges: converting user input and
//! formatting for display.

use serde::{Deserialize, Serialize};

use crate::error::AmountError;

/// Number of decimals of the TKOIN mint
pub const TKOIN_DECIMALS: u32 = 9;

/// Base units per whole token (10^9)
pub const BASE_UNITS_PER_TOKEN: i64 = 1_000_000_000;

/// TKOIN amount in base units
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TkoinAmount(pub i64);

impl TkoinAmount {
    pub const ZERO: TkoinAmount = TkoinAmount(0);

    /// Create from base units
    pub fn from_base_units(base_units: i64) -> Self {
        Self(base_units)
    }

    /// Create from a whole number of tokens
    pub fn from_whole_tokens(tokens: i64) -> Result<Self, AmountError> {
        if tokens < 0 {
            return Err(AmountError::Negative);
        }
        tokens
            .checked_mul(BASE_UNITS_PER_TOKEN)
            .map(Self)
            .ok_or(AmountError::Overflow)
    }

    /// Create from a (possibly fractional) token amount, rounding to the
    /// nearest base unit
    pub fn from_tokens(tokens: f64) -> Result<Self, AmountError> {
        if !tokens.is_finite() {
            return Err(AmountError::NotFinite);
        }
        if tokens < 0.0 {
            return Err(AmountError::Negative);
        }
        let base = (tokens * BASE_UNITS_PER_TOKEN as f64).round();
        if base >= i64::MAX as f64 {
            return Err(AmountError::Overflow);
        }
        Ok(Self(base as i64))
    }

    /// Value in base units
    pub fn base_units(&self) -> i64 {
        self.0
    }

    /// Value in tokens (display only)
    pub fn tokens(&self) -> f64 {
        self.0 as f64 / BASE_UNITS_PER_TOKEN as f64
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: TkoinAmount) -> Option<TkoinAmount> {
        self.0.checked_add(other.0).map(TkoinAmount)
    }

    pub fn checked_sub(self, other: TkoinAmount) -> Option<TkoinAmount> {
        self.0.checked_sub(other.0).map(TkoinAmount)
    }

    /// Subtract, clamping at zero
    pub fn saturating_sub(self, other: TkoinAmount) -> TkoinAmount {
        TkoinAmount((self.0 - other.0.min(self.0)).max(0))
    }

    /// `pct` percent of this amount, rounded down
    pub fn percent(&self, pct: u32) -> TkoinAmount {
        TkoinAmount(((self.0 as i128 * pct as i128) / 100) as i64)
    }

    /// `bps` basis points of this amount, rounded down
    pub fn bps(&self, bps: u32) -> TkoinAmount {
        TkoinAmount(((self.0 as i128 * bps as i128) / 10_000) as i64)
    }

    /// Format for display (e.g., "1250.5 TKOIN")
    pub fn display(&self) -> String {
        let whole = self.0 / BASE_UNITS_PER_TOKEN;
        let frac = (self.0 % BASE_UNITS_PER_TOKEN).abs();
        if frac == 0 {
            format!("{} TKOIN", whole)
        } else {
            let frac = format!("{:09}", frac);
            format!("{}.{} TKOIN", whole, frac.trim_end_matches('0'))
        }
    }
}

impl std::fmt::Display for TkoinAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
