//! Outbound webhook dispatcher
//!
//! Sends signed notifications to partner platforms and records the outcome
//! on the originating order or settlement row. Delivery is best effort:
//! a failed delivery never rolls back the ledger change that triggered it,
//! it only leaves `webhook_delivered = 0` for a later manual retry.
//!
//! Headers sent with each webhook:
//! - X-Signature: sha256=<hex(HMAC(secret, timestamp.body))>
//! - X-Timestamp: Unix timestamp
//! - X-Nonce: Unique per attempt
//! - X-Event: Event type (e.g., "order.completed")

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::WebhookConfig;
use crate::db::{with_conn, DbPool};
use crate::error::{SettlementError, SettlementResult};
use crate::logging::sanitize::sanitize_url;
use crate::models::p2p_order::P2pOrder;
use crate::models::platform_settlement::PlatformSettlement;
use crate::models::sovereign_platform::SovereignPlatform;
use crate::services::webhook_signing::{
    signature_header, EVENT_HEADER, NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};

/// Maximum response body to store (truncate after this)
const MAX_RESPONSE_BODY_BYTES: usize = 4096;

/// Which timeout applies to a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Asks the platform to check or acknowledge an order still in flight
    Verification,
    /// Reports money that has moved
    Settlement,
}

impl CallKind {
    /// Orders still on the payment path are verification calls; terminal
    /// order events report a settled lock
    pub fn for_order_event(event: &str) -> Self {
        match event {
            "order.created" | "order.payment_sent" => CallKind::Verification,
            _ => CallKind::Settlement,
        }
    }
}

/// Webhook event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    /// Stable across retries, for receiver-side idempotency
    pub event_id: String,
    pub nonce: String,
    pub timestamp: i64,
    pub data: serde_json::Value,
}

/// Outcome of all attempts for one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub delivered: bool,
    pub attempts: u32,
    pub last_response: Option<String>,
}

pub struct WebhookDispatcher {
    pool: DbPool,
    client: Client,
    config: WebhookConfig,
}

impl WebhookDispatcher {
    pub fn new(pool: DbPool, config: WebhookConfig) -> SettlementResult<Self> {
        let client = Client::builder()
            .user_agent("TKOIN-Webhook/1.0")
            .build()
            .map_err(|e| SettlementError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            pool,
            client,
            config,
        })
    }

    fn timeout_for(&self, kind: CallKind) -> Duration {
        match kind {
            CallKind::Verification => self.config.verification_timeout,
            CallKind::Settlement => self.config.settlement_timeout,
        }
    }

    /// Send one notification with bounded retries
    pub async fn deliver(
        &self,
        platform: &SovereignPlatform,
        event: &str,
        data: serde_json::Value,
        kind: CallKind,
    ) -> DeliveryOutcome {
        let event_id = uuid::Uuid::new_v4().to_string();
        let mut last_response = None;
        let mut backoff = self.config.retry_backoff;

        for attempt in 1..=self.config.max_attempts {
            match self.attempt(platform, event, &event_id, &data, kind).await {
                Ok((status, body)) if status.is_success() => {
                    info!(
                        platform_id = %platform.id,
                        event,
                        attempt,
                        status = status.as_u16(),
                        "Webhook delivered"
                    );
                    return DeliveryOutcome {
                        delivered: true,
                        attempts: attempt,
                        last_response: Some(format!("HTTP {} - {}", status.as_u16(), body)),
                    };
                }
                Ok((status, body)) => {
                    warn!(
                        platform_id = %platform.id,
                        event,
                        attempt,
                        status = status.as_u16(),
                        "Webhook delivery failed with HTTP error"
                    );
                    last_response = Some(format!("HTTP {} - {}", status.as_u16(), body));
                    if !is_retryable(status) {
                        return DeliveryOutcome {
                            delivered: false,
                            attempts: attempt,
                            last_response,
                        };
                    }
                }
                Err(e) => {
                    warn!(
                        platform_id = %platform.id,
                        endpoint = %sanitize_url(&platform.webhook_url),
                        event,
                        attempt,
                        error = %e,
                        "Webhook delivery failed with network error"
                    );
                    last_response = Some(e.to_string());
                }
            }
            if attempt < self.config.max_attempts {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        DeliveryOutcome {
            delivered: false,
            attempts: self.config.max_attempts,
            last_response,
        }
    }

    async fn attempt(
        &self,
        platform: &SovereignPlatform,
        event: &str,
        event_id: &str,
        data: &serde_json::Value,
        kind: CallKind,
    ) -> SettlementResult<(StatusCode, String)> {
        let envelope = WebhookEnvelope {
            event: event.to_string(),
            event_id: event_id.to_string(),
            nonce: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            data: data.clone(),
        };
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| SettlementError::Internal(format!("Failed to serialize webhook: {e}")))?;
        let signature = signature_header(&platform.webhook_secret, envelope.timestamp, &body)?;

        let response = self
            .client
            .post(&platform.webhook_url)
            .timeout(self.timeout_for(kind))
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(TIMESTAMP_HEADER, envelope.timestamp.to_string())
            .header(NONCE_HEADER, &envelope.nonce)
            .header(EVENT_HEADER, event)
            .body(body)
            .send()
            .await
            .map_err(|e| SettlementError::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(MAX_RESPONSE_BODY_BYTES)
            .collect::<String>();
        Ok((status, text))
    }

    /// Notify the order's platform of an order event and record the outcome
    ///
    /// Returns `None` when the order has no platform to notify.
    pub async fn notify_order(
        &self,
        order_id: &str,
        event: &str,
    ) -> SettlementResult<Option<DeliveryOutcome>> {
        let (order, platform) = {
            let order_id = order_id.to_string();
            with_conn(&self.pool, move |conn| {
                let order = P2pOrder::find_by_id(conn, &order_id)?;
                let platform = match &order.platform_id {
                    Some(pid) => Some(SovereignPlatform::find_by_id(conn, pid)?),
                    None => None,
                };
                Ok((order, platform))
            })
            .await?
        };
        let Some(platform) = platform.filter(SovereignPlatform::is_active) else {
            return Ok(None);
        };

        let data = serde_json::json!({
            "order_id": order.id,
            "agent_id": order.agent_id,
            "user_id": order.user_id,
            "status": order.status,
            "tkoin_amount": order.tkoin_amount,
            "fiat_amount_minor": order.fiat_amount_minor,
            "fiat_currency": order.fiat_currency,
        });
        let outcome = self
            .deliver(&platform, event, data, CallKind::for_order_event(event))
            .await;

        let recorded = outcome.clone();
        let order_id = order.id.clone();
        with_conn(&self.pool, move |conn| {
            P2pOrder::record_webhook_outcome(
                conn,
                &order_id,
                recorded.delivered,
                recorded.attempts as i32,
                recorded.last_response.as_deref(),
            )
        })
        .await?;
        Ok(Some(outcome))
    }

    /// Notify the platform that a settlement finished and record the outcome
    ///
    /// Returns `None` when the platform is inactive; the row stays
    /// undelivered until a redelivery after reactivation.
    pub async fn notify_settlement(
        &self,
        settlement_id: &str,
    ) -> SettlementResult<Option<DeliveryOutcome>> {
        let (settlement, platform) = {
            let settlement_id = settlement_id.to_string();
            with_conn(&self.pool, move |conn| {
                let settlement = PlatformSettlement::find_by_id(conn, &settlement_id)?;
                let platform = SovereignPlatform::find_by_id(conn, &settlement.platform_id)?;
                Ok((settlement, platform))
            })
            .await?
        };
        if !platform.is_active() {
            return Ok(None);
        }

        let data = serde_json::json!({
            "settlement_id": settlement.id,
            "kind": settlement.kind,
            "reference": settlement.external_reference,
            "user_id": settlement.user_id,
            "tkoin_amount": settlement.tkoin_amount,
            "status": settlement.status,
        });
        let event = format!("{}.{}", settlement.kind, settlement.status);
        let outcome = self.deliver(&platform, &event, data, CallKind::Settlement).await;

        let recorded = outcome.clone();
        let settlement_id = settlement.id.clone();
        with_conn(&self.pool, move |conn| {
            PlatformSettlement::record_webhook_outcome(
                conn,
                &settlement_id,
                recorded.delivered,
                recorded.attempts as i32,
                recorded.last_response.as_deref(),
            )
        })
        .await?;
        Ok(Some(outcome))
    }
}

/// Timeouts, throttling and server errors are worth another attempt
fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Fire-and-forget order notification. Never blocks, never fails the caller.
pub fn emit_order_event_nonblocking(
    dispatcher: Arc<WebhookDispatcher>,
    order_id: String,
    event: &'static str,
) {
    tokio::spawn(async move {
        match dispatcher.notify_order(&order_id, event).await {
            Ok(Some(outcome)) if !outcome.delivered => warn!(
                order_id = %order_id,
                event,
                attempts = outcome.attempts,
                "Order notification left undelivered"
            ),
            Ok(_) => {}
            Err(e) => warn!(order_id = %order_id, error = %e, "Order notification failed"),
        }
    });
}
