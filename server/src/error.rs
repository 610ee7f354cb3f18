//! Settlement error taxonomy
//!
//! Every core operation returns [`SettlementResult`]. Variants map onto the
//! business outcomes callers must tell apart (insufficient funds vs. a lost
//! race vs. a replayed webhook) and onto HTTP responses through
//! [`actix_web::ResponseError`].
//!
//! # Error Code Categories
//! - VAL-xxx: input validation
//! - LEDGER-xxx: balance locking and transfers
//! - STAKE-xxx: staking rules
//! - GOV-xxx: governance state machines and safety limits
//! - ORDER-xxx: P2P order lifecycle
//! - HOOK-xxx: webhook authentication and replay protection
//! - SYS-xxx: infrastructure

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tkoin_types::{AmountError, ParseEnumError, TransitionError};

/// Errors produced by the settlement core
#[derive(Error, Debug)]
pub enum SettlementError {
    /// Bad input; nothing was written
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient balance for agent {agent_id}: available {available}, requested {requested}")]
    InsufficientBalance {
        agent_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Insufficient staked balance: staked {staked}, requested {requested}")]
    InsufficientStakedBalance { staked: i64, requested: i64 },

    /// A conditional update matched zero rows because the row changed
    /// between read and write
    #[error("Concurrent update conflict on {entity} {id}")]
    ConcurrentConflict { entity: &'static str, id: String },

    #[error("Concurrent unlock conflict for agent {agent_id}: locked balance below {amount}")]
    ConcurrentUnlockConflict { agent_id: String, amount: i64 },

    #[error("Stake is locked for {days_remaining} more day(s) (until {locked_until})")]
    StakeLocked {
        days_remaining: i64,
        locked_until: NaiveDateTime,
    },

    #[error("Safety limit violated: {0}")]
    SafetyLimitViolation(String),

    #[error("Replay detected: nonce {0} was already used")]
    ReplayDetected(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook timestamp {0} is outside the freshness window")]
    StaleTimestamp(i64),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("On-chain read failed: {0}")]
    OnChain(String),

    #[error("HTTP delivery failed: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SettlementError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        SettlementError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn conflict(entity: &'static str, id: impl Into<String>) -> Self {
        SettlementError::ConcurrentConflict {
            entity,
            id: id.into(),
        }
    }

    /// Returns true if the caller may retry once with fresh state
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SettlementError::ConcurrentConflict { .. }
                | SettlementError::ConcurrentUnlockConflict { .. }
                | SettlementError::Pool(_)
                | SettlementError::OnChain(_)
                | SettlementError::Http(_)
        )
    }

    /// Returns true if this error must be logged as a security event
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            SettlementError::ReplayDetected(_)
                | SettlementError::InvalidSignature
                | SettlementError::StaleTimestamp(_)
        )
    }

    /// Stable error code exposed to API clients
    pub fn error_code(&self) -> &'static str {
        match self {
            SettlementError::Validation(_) => "VAL-001",
            SettlementError::InsufficientBalance { .. } => "LEDGER-001",
            SettlementError::ConcurrentConflict { .. } => "LEDGER-002",
            SettlementError::ConcurrentUnlockConflict { .. } => "LEDGER-003",
            SettlementError::InsufficientStakedBalance { .. } => "STAKE-001",
            SettlementError::StakeLocked { .. } => "STAKE-002",
            SettlementError::SafetyLimitViolation(_) => "GOV-001",
            SettlementError::InvalidTransition(_) => "GOV-002",
            SettlementError::NotFound { .. } => "NF-001",
            SettlementError::ReplayDetected(_) => "HOOK-001",
            SettlementError::InvalidSignature => "HOOK-002",
            SettlementError::StaleTimestamp(_) => "HOOK-003",
            SettlementError::Unauthorized(_) => "HOOK-004",
            SettlementError::Database(_) | SettlementError::Pool(_) => "SYS-001",
            SettlementError::OnChain(_) => "SYS-002",
            SettlementError::Http(_) => "SYS-003",
            SettlementError::Internal(_) => "SYS-004",
        }
    }
}

impl From<diesel::r2d2::PoolError> for SettlementError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        SettlementError::Pool(e.to_string())
    }
}

impl From<tokio::task::JoinError> for SettlementError {
    fn from(e: tokio::task::JoinError) -> Self {
        SettlementError::Internal(format!("Blocking task failed: {e}"))
    }
}

impl From<AmountError> for SettlementError {
    fn from(e: AmountError) -> Self {
        SettlementError::Validation(e.to_string())
    }
}

impl From<ParseEnumError> for SettlementError {
    fn from(e: ParseEnumError) -> Self {
        SettlementError::Validation(e.to_string())
    }
}

/// Result type for settlement operations
pub type SettlementResult<T> = Result<T, SettlementError>;

/// Error response body with a standardized error code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,
    pub error_code: String,
    pub error: String,
    /// Whether the client can act and retry
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str, recoverable: bool) -> Self {
        Self {
            success: false,
            error_code: code.to_string(),
            error: message.to_string(),
            recoverable,
            details: None,
        }
    }

    pub fn with_details(mut self, details: &str) -> Self {
        self.details = Some(details.to_string());
        self
    }
}

impl ResponseError for SettlementError {
    fn status_code(&self) -> StatusCode {
        match self {
            SettlementError::Validation(_)
            | SettlementError::InsufficientBalance { .. }
            | SettlementError::InsufficientStakedBalance { .. } => StatusCode::BAD_REQUEST,
            SettlementError::ConcurrentConflict { .. }
            | SettlementError::ConcurrentUnlockConflict { .. }
            | SettlementError::InvalidTransition(_) => StatusCode::CONFLICT,
            SettlementError::StakeLocked { .. } => StatusCode::LOCKED,
            SettlementError::SafetyLimitViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SettlementError::ReplayDetected(_)
            | SettlementError::InvalidSignature
            | SettlementError::StaleTimestamp(_)
            | SettlementError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SettlementError::NotFound { .. } => StatusCode::NOT_FOUND,
            SettlementError::OnChain(_) | SettlementError::Http(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SettlementError::Database(_)
            | SettlementError::Pool(_)
            | SettlementError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Infrastructure details stay in the logs
        let message = if status.is_server_error() {
            match self {
                SettlementError::OnChain(_) | SettlementError::Http(_) => {
                    "Upstream service unavailable".to_string()
                }
                _ => "Internal server error".to_string(),
            }
        } else if self.is_security_event() {
            "Webhook authentication failed".to_string()
        } else {
            self.to_string()
        };

        let mut body = ErrorResponse::new(self.error_code(), &message, self.is_transient());
        if let SettlementError::StakeLocked { days_remaining, .. } = self {
            body = body.with_details(&format!("days_remaining={days_remaining}"));
        }
        HttpResponse::build(status).json(body)
    }
}
