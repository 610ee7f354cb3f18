//! Inbound webhook verification
//!
//! Checks, in order: platform known and active, timestamp fresh, signature
//! valid, nonce unused. The nonce is consumed last so that unauthenticated
//! requests cannot burn nonces. Any failure stops the request before
//! business logic runs.

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::config::WebhookConfig;
use crate::db::{with_conn, DbPool};
use crate::error::{SettlementError, SettlementResult};
use crate::models::sovereign_platform::SovereignPlatform;
use crate::models::webhook_nonce::WebhookNonce;
use crate::services::webhook_signing::{check_timestamp, verify_signature};

/// Authentication headers of an inbound request
#[derive(Debug, Clone, Default)]
pub struct InboundHeaders {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
}

/// Take the nonce from the header, falling back to a `nonce` body field
fn extract_nonce(headers: &InboundHeaders, body: &[u8]) -> Option<String> {
    headers
        .nonce
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| {
            let parsed: serde_json::Value = serde_json::from_slice(body).ok()?;
            let nonce = parsed.get("nonce")?.as_str()?.trim();
            (!nonce.is_empty()).then(|| nonce.to_string())
        })
}

pub struct WebhookVerifier {
    pool: DbPool,
    config: WebhookConfig,
}

impl WebhookVerifier {
    pub fn new(pool: DbPool, config: WebhookConfig) -> Self {
        Self { pool, config }
    }

    /// Authenticate an inbound request from `platform_id`
    pub async fn verify_inbound(
        &self,
        platform_id: &str,
        headers: &InboundHeaders,
        body: &[u8],
    ) -> SettlementResult<SovereignPlatform> {
        let result = self.verify(platform_id, headers, body).await;
        if let Err(e) = &result {
            if e.is_security_event() {
                warn!(
                    security_event = true,
                    platform_id = %platform_id,
                    error_code = e.error_code(),
                    error = %e,
                    "Inbound webhook rejected"
                );
            }
        }
        result
    }

    async fn verify(
        &self,
        platform_id: &str,
        headers: &InboundHeaders,
        body: &[u8],
    ) -> SettlementResult<SovereignPlatform> {
        let platform = {
            let platform_id = platform_id.to_string();
            with_conn(&self.pool, move |conn| {
                SovereignPlatform::find_by_id(conn, &platform_id)
            })
            .await?
        };
        if !platform.is_active() {
            return Err(SettlementError::Unauthorized(format!(
                "platform {platform_id} is inactive"
            )));
        }

        let timestamp_header = headers
            .timestamp
            .as_deref()
            .ok_or_else(|| SettlementError::Unauthorized("missing timestamp".to_string()))?;
        let signature_header = headers
            .signature
            .as_deref()
            .ok_or(SettlementError::InvalidSignature)?;

        let now = Utc::now();
        let timestamp = check_timestamp(
            timestamp_header,
            now.timestamp(),
            self.config.freshness_window_secs,
        )?;
        verify_signature(&platform.webhook_secret, timestamp, body, signature_header)?;

        let nonce = extract_nonce(headers, body)
            .ok_or_else(|| SettlementError::Unauthorized("missing nonce".to_string()))?;
        let expires_at = now.naive_utc() + Duration::seconds(self.config.nonce_retention_secs);
        let nonce_platform = platform.id.clone();
        let nonce_for_log = crate::log_id!(&nonce);
        with_conn(&self.pool, move |conn| {
            WebhookNonce::consume(conn, &nonce, &nonce_platform, expires_at)
        })
        .await?;
        debug!(
            platform_id = %platform.id,
            timestamp,
            nonce = %nonce_for_log,
            "Inbound webhook authenticated"
        );

        Ok(platform)
    }
}
