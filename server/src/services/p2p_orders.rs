//! P2P order state machine
//!
//! ```text
//! created ──> payment_pending ──> payment_sent ──> verifying ──> completed
//!    │                                                 │
//!    └──────────────> cancelled <──────────────────────┘
//! any non-terminal state ──> expired (deadline passed)
//! ```
//!
//! Creating an order locks the agent's TKOIN. Completion transfers the
//! lock out, cancellation and expiry unlock it. The terminal status update
//! and the ledger call share one transaction, and the status update is
//! conditional on the order still being in a source state, so the lock is
//! settled exactly once even when the expiry sweep races a completion.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tkoin_types::{OrderStatus, TkoinAmount};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{with_conn, write_txn, DbPool};
use crate::error::{SettlementError, SettlementResult};
use crate::models::agent::Agent;
use crate::models::audit_event::{event_types, Actor, AuditEventBuilder};
use crate::models::p2p_order::{NewP2pOrder, P2pOrder};
use crate::models::sovereign_platform::SovereignPlatform;
use crate::services::ledger;
use crate::services::webhook_dispatcher::{emit_order_event_nonblocking, WebhookDispatcher};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub agent_id: String,
    pub user_id: String,
    pub platform_id: Option<String>,
    pub tkoin_amount: TkoinAmount,
    pub fiat_amount_minor: i64,
    pub fiat_currency: String,
    pub payment_method: Option<String>,
    /// Defaults to the configured order TTL
    pub ttl_secs: Option<i64>,
}

impl CreateOrderRequest {
    fn validate(&self, max_ttl_secs: i64) -> SettlementResult<()> {
        if !self.tkoin_amount.is_positive() {
            return Err(SettlementError::Validation(
                "order amount must be positive".to_string(),
            ));
        }
        if self.fiat_amount_minor <= 0 {
            return Err(SettlementError::Validation(
                "fiat amount must be positive".to_string(),
            ));
        }
        let currency = self.fiat_currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SettlementError::Validation(format!(
                "invalid currency code {:?}",
                self.fiat_currency
            )));
        }
        if self.user_id.trim().is_empty() {
            return Err(SettlementError::Validation("user id is required".to_string()));
        }
        if let Some(ttl) = self.ttl_secs {
            if ttl <= 0 || ttl > max_ttl_secs {
                return Err(SettlementError::Validation(format!(
                    "order ttl must be between 1 and {max_ttl_secs} seconds"
                )));
            }
        }
        Ok(())
    }
}

/// Result of a terminal transition request
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: P2pOrder,
    /// False when the order was already in the target state and nothing
    /// was done
    pub applied: bool,
}

pub struct OrderService {
    pool: DbPool,
    default_ttl_secs: i64,
    max_ttl_secs: i64,
    dispatcher: Option<Arc<WebhookDispatcher>>,
}

impl OrderService {
    pub fn new(pool: DbPool, default_ttl_secs: i64, max_ttl_secs: i64) -> Self {
        Self {
            pool,
            default_ttl_secs,
            max_ttl_secs,
            dispatcher: None,
        }
    }

    /// Send `order.*` notifications to the order's platform
    pub fn with_webhook_dispatcher(mut self, dispatcher: Arc<WebhookDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Create an order and lock the agent's TKOIN for it
    pub async fn create_order(&self, request: CreateOrderRequest) -> SettlementResult<P2pOrder> {
        request.validate(self.max_ttl_secs)?;
        let ttl = Duration::try_seconds(request.ttl_secs.unwrap_or(self.default_ttl_secs))
            .ok_or_else(|| SettlementError::Validation("order ttl out of range".to_string()))?;

        let order = with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| {
                let agent = Agent::find_by_id(conn, &request.agent_id)?;
                agent.ensure_active()?;
                if let Some(platform_id) = &request.platform_id {
                    let platform = SovereignPlatform::find_by_id(conn, platform_id)?;
                    if !platform.is_active() {
                        return Err(SettlementError::Validation(format!(
                            "platform {platform_id} is inactive"
                        )));
                    }
                }

                let now = Utc::now().naive_utc();
                let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
                    SettlementError::Validation("order deadline out of range".to_string())
                })?;

                ledger::lock(conn, &agent.id, request.tkoin_amount)?;

                P2pOrder::insert(
                    conn,
                    &NewP2pOrder {
                        id: Uuid::new_v4().to_string(),
                        agent_id: agent.id.clone(),
                        user_id: request.user_id.trim().to_string(),
                        platform_id: request.platform_id.clone(),
                        tkoin_amount: request.tkoin_amount.base_units(),
                        fiat_amount_minor: request.fiat_amount_minor,
                        fiat_currency: request.fiat_currency.trim().to_ascii_uppercase(),
                        payment_method: request.payment_method.clone(),
                        status: OrderStatus::Created.as_str().to_string(),
                        expires_at,
                        webhook_delivered: 0,
                        webhook_attempts: 0,
                        created_at: now,
                        updated_at: now,
                    },
                )
            })
        })
        .await?;

        info!(
            order_id = %order.id,
            agent_id = %order.agent_id,
            amount = order.tkoin_amount,
            expires_at = %order.expires_at,
            "P2P order created"
        );
        self.notify(&order, "order.created");
        Ok(order)
    }

    /// Move an order along its payment path
    /// (`payment_pending`, `payment_sent`, `verifying`)
    pub async fn advance(&self, order_id: &str, next: OrderStatus) -> SettlementResult<P2pOrder> {
        if next.is_terminal() {
            return Err(SettlementError::Validation(format!(
                "{next} is a terminal state; use complete, cancel or expire"
            )));
        }
        let order_id = order_id.to_string();
        let order = with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| {
                let order = P2pOrder::find_by_id(conn, &order_id)?;
                order.order_status()?.transition(next)?;
                if order.is_expired_at(Utc::now().naive_utc()) {
                    return Err(SettlementError::Validation(format!(
                        "order {order_id} has passed its deadline"
                    )));
                }
                if !P2pOrder::transition_from(conn, &order_id, next, None)? {
                    return Err(SettlementError::conflict("order", &order_id));
                }
                P2pOrder::find_by_id(conn, &order_id)
            })
        })
        .await?;

        debug!(order_id = %order.id, status = %order.status, "Order advanced");
        if next == OrderStatus::PaymentSent {
            self.notify(&order, "order.payment_sent");
        }
        Ok(order)
    }

    /// Complete a verified order, transferring the locked TKOIN out
    pub async fn complete_order(&self, order_id: &str) -> SettlementResult<TransitionOutcome> {
        self.finish(order_id, OrderStatus::Completed, None, &Actor::system())
            .await
    }

    /// Cancel an order, releasing its lock
    pub async fn cancel_order(
        &self,
        order_id: &str,
        reason: &str,
        actor: &Actor,
    ) -> SettlementResult<TransitionOutcome> {
        self.finish(order_id, OrderStatus::Cancelled, Some(reason), actor)
            .await
    }

    /// Expire an order past its deadline, releasing its lock
    pub async fn expire_order(&self, order_id: &str) -> SettlementResult<TransitionOutcome> {
        self.finish(
            order_id,
            OrderStatus::Expired,
            Some("deadline passed"),
            &Actor::system(),
        )
        .await
    }

    async fn finish(
        &self,
        order_id: &str,
        target: OrderStatus,
        reason: Option<&str>,
        actor: &Actor,
    ) -> SettlementResult<TransitionOutcome> {
        let order_id = order_id.to_string();
        let reason = reason.map(str::to_string);
        let actor = actor.clone();

        let outcome = with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| {
                let before = P2pOrder::find_by_id(conn, &order_id)?;
                if target == OrderStatus::Expired && !before.is_expired_at(Utc::now().naive_utc()) {
                    return Err(SettlementError::Validation(format!(
                        "order {order_id} has not reached its deadline"
                    )));
                }

                if !P2pOrder::transition_from(conn, &order_id, target, reason.as_deref())? {
                    // Lost the race or already settled: detect by status,
                    // never settle the lock a second time
                    let current = before.order_status()?;
                    if current == target {
                        return Ok(TransitionOutcome {
                            order: before,
                            applied: false,
                        });
                    }
                    current.transition(target)?;
                    return Err(SettlementError::conflict("order", &order_id));
                }

                let amount = before.amount();
                if target == OrderStatus::Completed {
                    ledger::transfer(conn, &before.agent_id, amount)?;
                } else {
                    ledger::unlock(conn, &before.agent_id, amount)?;
                }
                let audit_type = match target {
                    OrderStatus::Expired => Some(event_types::ORDER_EXPIRED),
                    OrderStatus::Cancelled => Some(event_types::ORDER_CANCELLED),
                    _ => None,
                };
                if let Some(event_type) = audit_type {
                    let mut event = AuditEventBuilder::new(event_type, &actor)
                        .entity("p2p_order", &order_id)
                        .metadata("agent_id", &before.agent_id)
                        .metadata("released", amount.base_units())
                        .metadata("previous_status", &before.status);
                    if let Some(reason) = &reason {
                        event = event.metadata("reason", reason);
                    }
                    event.append(conn)?;
                }

                Ok(TransitionOutcome {
                    order: P2pOrder::find_by_id(conn, &order_id)?,
                    applied: true,
                })
            })
        })
        .await?;

        if outcome.applied {
            info!(
                order_id = %outcome.order.id,
                agent_id = %outcome.order.agent_id,
                status = %outcome.order.status,
                amount = outcome.order.tkoin_amount,
                "Order settled"
            );
            let event = match target {
                OrderStatus::Completed => "order.completed",
                OrderStatus::Cancelled => "order.cancelled",
                _ => "order.expired",
            };
            self.notify(&outcome.order, event);
        } else {
            debug!(order_id = %outcome.order.id, status = %outcome.order.status, "Order already settled");
        }
        Ok(outcome)
    }

    fn notify(&self, order: &P2pOrder, event: &'static str) {
        if order.platform_id.is_none() {
            return;
        }
        if let Some(dispatcher) = &self.dispatcher {
            emit_order_event_nonblocking(dispatcher.clone(), order.id.clone(), event);
        }
    }

    pub async fn get_order(&self, order_id: &str) -> SettlementResult<P2pOrder> {
        let order_id = order_id.to_string();
        with_conn(&self.pool, move |conn| P2pOrder::find_by_id(conn, &order_id)).await
    }

    pub async fn list_for_agent(&self, agent_id: &str, limit: i64) -> SettlementResult<Vec<P2pOrder>> {
        let agent_id = agent_id.to_string();
        let limit = limit.clamp(1, 500);
        with_conn(&self.pool, move |conn| P2pOrder::find_by_agent(conn, &agent_id, limit)).await
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}
