//! Inbound partner platform webhooks
//!
//! Endpoint:
//! - POST /api/platforms/{platform_id}/webhook
//!
//! Authentication happens before the body is interpreted: a bad
//! signature, stale timestamp or reused nonce is answered with 401 and
//! nothing else runs.

use actix_web::{post, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{SettlementError, SettlementResult};
use crate::models::platform_settlement::SettlementKind;
use crate::services::settlement::{InboundSettlement, SettlementService};
use crate::services::webhook_signing::{NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::services::webhook_verifier::{InboundHeaders, WebhookVerifier};

/// Services the inbound endpoint needs
pub struct WebhookState {
    pub verifier: Arc<WebhookVerifier>,
    pub settlements: Arc<SettlementService>,
}

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    event: String,
    data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct InboundAccepted {
    pub success: bool,
    pub settlement_id: String,
    pub duplicate: bool,
}

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn kind_for_event(event: &str) -> SettlementResult<SettlementKind> {
    match event {
        "deposit.requested" => Ok(SettlementKind::Deposit),
        "withdrawal.requested" => Ok(SettlementKind::Withdrawal),
        other => Err(SettlementError::Validation(format!(
            "unsupported event {other:?}"
        ))),
    }
}

#[post("/api/platforms/{platform_id}/webhook")]
pub async fn receive_platform_webhook(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    state: web::Data<WebhookState>,
) -> Result<HttpResponse, SettlementError> {
    let platform_id = path.into_inner();
    let headers = InboundHeaders {
        signature: header(&req, SIGNATURE_HEADER),
        timestamp: header(&req, TIMESTAMP_HEADER),
        nonce: header(&req, NONCE_HEADER),
    };
    let platform = state
        .verifier
        .verify_inbound(&platform_id, &headers, &body)
        .await?;

    let envelope: InboundEnvelope = serde_json::from_slice(&body)
        .map_err(|e| SettlementError::Validation(format!("malformed webhook body: {e}")))?;
    let kind = kind_for_event(&envelope.event)?;
    let inbound: InboundSettlement = serde_json::from_value(envelope.data)
        .map_err(|e| SettlementError::Validation(format!("malformed settlement data: {e}")))?;

    let (settlement, created) = state
        .settlements
        .record_inbound(&platform.id, kind, inbound)
        .await?;

    Ok(HttpResponse::Accepted().json(InboundAccepted {
        success: true,
        settlement_id: settlement.id,
        duplicate: !created,
    }))
}
