//! Slashing and burn-proposal governance states

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ParseEnumError, TransitionError};

/// Severity of a policy violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashSeverity {
    Minor,
    Major,
    Critical,
}

impl SlashSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlashSeverity::Minor => "minor",
            SlashSeverity::Major => "major",
            SlashSeverity::Critical => "critical",
        }
    }
}

impl FromStr for SlashSeverity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minor" => Ok(SlashSeverity::Minor),
            "major" => Ok(SlashSeverity::Major),
            "critical" => Ok(SlashSeverity::Critical),
            _ => Err(ParseEnumError::new("severity", s)),
        }
    }
}

/// Slashing event lifecycle: `pending -> executed -> reversed`.
///
/// A pending event can only be executed. Only an executed event can be
/// reversed, since there is nothing to undo before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashStatus {
    Pending,
    Executed,
    Reversed,
}

impl SlashStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlashStatus::Pending => "pending",
            SlashStatus::Executed => "executed",
            SlashStatus::Reversed => "reversed",
        }
    }

    pub fn can_transition_to(&self, next: SlashStatus) -> bool {
        matches!(
            (self, next),
            (SlashStatus::Pending, SlashStatus::Executed)
                | (SlashStatus::Executed, SlashStatus::Reversed)
        )
    }

    pub fn transition(self, next: SlashStatus) -> Result<SlashStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                entity: "slashing event",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

impl FromStr for SlashStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SlashStatus::Pending),
            "executed" => Ok(SlashStatus::Executed),
            "reversed" => Ok(SlashStatus::Reversed),
            _ => Err(ParseEnumError::new("slash status", s)),
        }
    }
}

/// Burn proposal lifecycle: `pending -> approved|rejected`, `approved -> executed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurnStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl BurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BurnStatus::Pending => "pending",
            BurnStatus::Approved => "approved",
            BurnStatus::Rejected => "rejected",
            BurnStatus::Executed => "executed",
        }
    }

    pub fn can_transition_to(&self, next: BurnStatus) -> bool {
        matches!(
            (self, next),
            (BurnStatus::Pending, BurnStatus::Approved)
                | (BurnStatus::Pending, BurnStatus::Rejected)
                | (BurnStatus::Approved, BurnStatus::Executed)
        )
    }

    pub fn transition(self, next: BurnStatus) -> Result<BurnStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                entity: "burn proposal",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Statuses whose amounts count against the rolling burn window
    pub fn counts_toward_window(&self) -> bool {
        !matches!(self, BurnStatus::Rejected)
    }
}

impl FromStr for BurnStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BurnStatus::Pending),
            "approved" => Ok(BurnStatus::Approved),
            "rejected" => Ok(BurnStatus::Rejected),
            "executed" => Ok(BurnStatus::Executed),
            _ => Err(ParseEnumError::new("burn status", s)),
        }
    }
}
