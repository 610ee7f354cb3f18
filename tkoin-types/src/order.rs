//! P2P order lifecycle
//!
//! ```text
//! created ──► payment_pending ──► payment_sent ──► verifying ──► completed
//!    │                                                  │
//!    └──────────────► cancelled ◄───────────────────────┘
//!
//! any non-terminal ──► expired (once expires_at has passed)
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ParseEnumError, TransitionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    PaymentPending,
    PaymentSent,
    Verifying,
    Completed,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub const NON_TERMINAL: [OrderStatus; 4] = [
        OrderStatus::Created,
        OrderStatus::PaymentPending,
        OrderStatus::PaymentSent,
        OrderStatus::Verifying,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::PaymentSent => "payment_sent",
            OrderStatus::Verifying => "verifying",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }

    /// Terminal states that hand the locked TKOIN back to the agent
    pub fn releases_lock(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Expired)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Created, PaymentPending) | (Created, Cancelled) => true,
            (PaymentPending, PaymentSent) => true,
            (PaymentSent, Verifying) => true,
            (Verifying, Completed) | (Verifying, Cancelled) => true,
            (from, Expired) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn transition(self, next: OrderStatus) -> Result<OrderStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                entity: "order",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Non-terminal states that may move to `next`
    pub fn sources_of(next: OrderStatus) -> Vec<OrderStatus> {
        Self::NON_TERMINAL
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(OrderStatus::Created),
            "payment_pending" => Ok(OrderStatus::PaymentPending),
            "payment_sent" => Ok(OrderStatus::PaymentSent),
            "verifying" => Ok(OrderStatus::Verifying),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "expired" => Ok(OrderStatus::Expired),
            _ => Err(ParseEnumError::new("order status", s)),
        }
    }
}
