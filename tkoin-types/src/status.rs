//! Agent and stake status enums

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ParseEnumError;

/// Agent account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Active,
    Revoked,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Active => "active",
            AgentStatus::Revoked => "revoked",
        }
    }
}

impl FromStr for AgentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AgentStatus::Pending),
            "active" => Ok(AgentStatus::Active),
            "revoked" => Ok(AgentStatus::Revoked),
            _ => Err(ParseEnumError::new("agent status", s)),
        }
    }
}

/// Status of an agent's stake row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeStatus {
    Active,
    /// Fully withdrawn; the row is kept for history
    Unstaking,
}

impl StakeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StakeStatus::Active => "active",
            StakeStatus::Unstaking => "unstaking",
        }
    }
}

impl FromStr for StakeStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StakeStatus::Active),
            "unstaking" => Ok(StakeStatus::Unstaking),
            _ => Err(ParseEnumError::new("stake status", s)),
        }
    }
}

/// Operation recorded in the stake history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeOperation {
    Stake,
    Unstake,
}

impl StakeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StakeOperation::Stake => "stake",
            StakeOperation::Unstake => "unstake",
        }
    }
}

impl FromStr for StakeOperation {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stake" => Ok(StakeOperation::Stake),
            "unstake" => Ok(StakeOperation::Unstake),
            _ => Err(ParseEnumError::new("stake operation", s)),
        }
    }
}
