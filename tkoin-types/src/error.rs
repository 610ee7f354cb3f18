//! Errors produced while parsing or transitioning shared types

use thiserror::Error;

/// A string could not be parsed into one of the shared enums
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// A state machine refused a transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {entity} transition: {from} -> {to}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

/// Amount conversion failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is not a finite number")]
    NotFinite,

    #[error("amount must not be negative")]
    Negative,

    #[error("amount exceeds the representable range")]
    Overflow,
}
