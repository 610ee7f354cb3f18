//! Platform settlements
//!
//! Deposits and withdrawals are reported by partner platforms through
//! verified inbound webhooks and recorded here idempotently on
//! `(platform_id, reference)`. Finishing a settlement sends the signed
//! outbound notification; its outcome is written back onto the row and a
//! failed delivery leaves the settlement itself untouched.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tkoin_types::TkoinAmount;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{with_conn, write_txn, DbPool};
use crate::error::{SettlementError, SettlementResult};
use crate::models::audit_event::{event_types, Actor, AuditEventBuilder};
use crate::models::platform_settlement::{
    NewPlatformSettlement, PlatformSettlement, SettlementKind, SettlementStatus,
};
use crate::models::sovereign_platform::SovereignPlatform;
use crate::services::webhook_dispatcher::{DeliveryOutcome, WebhookDispatcher};

/// `data` of a `deposit.requested` / `withdrawal.requested` webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundSettlement {
    pub reference: String,
    pub user_id: String,
    /// Base units
    pub tkoin_amount: i64,
}

impl InboundSettlement {
    fn validate(&self) -> SettlementResult<()> {
        if self.reference.trim().is_empty() {
            return Err(SettlementError::Validation("reference is required".to_string()));
        }
        if self.user_id.trim().is_empty() {
            return Err(SettlementError::Validation("user id is required".to_string()));
        }
        if self.tkoin_amount <= 0 {
            return Err(SettlementError::Validation(
                "settlement amount must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SettlementCompletion {
    pub settlement: PlatformSettlement,
    /// `None` when the settlement had already been finished or its
    /// platform is inactive
    pub notification: Option<DeliveryOutcome>,
}

pub struct SettlementService {
    pool: DbPool,
    dispatcher: Arc<WebhookDispatcher>,
}

impl SettlementService {
    pub fn new(pool: DbPool, dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self { pool, dispatcher }
    }

    /// Register a partner platform
    pub async fn register_platform(
        &self,
        id: &str,
        name: &str,
        webhook_url: &str,
        webhook_secret: &str,
        actor: &Actor,
    ) -> SettlementResult<SovereignPlatform> {
        let (id, name, url, secret) = (
            id.to_string(),
            name.to_string(),
            webhook_url.to_string(),
            webhook_secret.to_string(),
        );
        let actor = actor.clone();
        with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| {
                let platform = SovereignPlatform::register(conn, &id, &name, &url, &secret)?;
                AuditEventBuilder::new(event_types::PLATFORM_REGISTERED, &actor)
                    .entity("platform", &platform.id)
                    .metadata("name", &platform.name)
                    .append(conn)?;
                info!(
                    platform_id = %platform.id,
                    endpoint = %crate::logging::sanitize::sanitize_url(&platform.webhook_url),
                    secret = %crate::log_secret!(&secret),
                    "Platform registered"
                );
                Ok(platform)
            })
        })
        .await
    }

    /// Activate or deactivate a platform
    pub async fn set_platform_active(
        &self,
        platform_id: &str,
        active: bool,
        actor: &Actor,
    ) -> SettlementResult<()> {
        let platform_id = platform_id.to_string();
        let actor = actor.clone();
        with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| {
                SovereignPlatform::set_active(conn, &platform_id, active)?;
                AuditEventBuilder::new(event_types::PLATFORM_STATUS_CHANGED, &actor)
                    .entity("platform", &platform_id)
                    .metadata("active", active)
                    .append(conn)?;
                Ok(())
            })
        })
        .await
    }

    /// Record a settlement reported by a verified platform webhook
    ///
    /// Returns the row and whether it was newly created; a repeated
    /// reference returns the existing row unchanged.
    pub async fn record_inbound(
        &self,
        platform_id: &str,
        kind: SettlementKind,
        inbound: InboundSettlement,
    ) -> SettlementResult<(PlatformSettlement, bool)> {
        inbound.validate()?;
        let platform_id = platform_id.to_string();
        let (settlement, created) = with_conn(&self.pool, move |conn| {
            let now = Utc::now().naive_utc();
            PlatformSettlement::insert_or_existing(
                conn,
                &NewPlatformSettlement {
                    id: Uuid::new_v4().to_string(),
                    platform_id,
                    kind: kind.as_str().to_string(),
                    external_reference: inbound.reference.trim().to_string(),
                    user_id: inbound.user_id.trim().to_string(),
                    tkoin_amount: inbound.tkoin_amount,
                    status: SettlementStatus::Received.as_str().to_string(),
                    webhook_delivered: 0,
                    webhook_attempts: 0,
                    created_at: now,
                    updated_at: now,
                },
            )
        })
        .await?;

        if created {
            info!(
                settlement_id = %settlement.id,
                platform_id = %settlement.platform_id,
                kind = %settlement.kind,
                amount = %TkoinAmount(settlement.tkoin_amount),
                "Settlement recorded"
            );
        } else {
            info!(settlement_id = %settlement.id, "Duplicate settlement reference, keeping existing row");
        }
        Ok((settlement, created))
    }

    /// Mark a settlement completed and notify its platform
    pub async fn complete_settlement(&self, settlement_id: &str) -> SettlementResult<SettlementCompletion> {
        self.finish(settlement_id, SettlementStatus::Completed).await
    }

    /// Mark a settlement failed and notify its platform
    pub async fn fail_settlement(&self, settlement_id: &str) -> SettlementResult<SettlementCompletion> {
        self.finish(settlement_id, SettlementStatus::Failed).await
    }

    async fn finish(
        &self,
        settlement_id: &str,
        outcome: SettlementStatus,
    ) -> SettlementResult<SettlementCompletion> {
        let id = settlement_id.to_string();
        let changed = with_conn(&self.pool, move |conn| {
            PlatformSettlement::find_by_id(conn, &id)?;
            PlatformSettlement::finish(conn, &id, outcome)
        })
        .await?;

        let notification = if changed {
            let delivery = self.dispatcher.notify_settlement(settlement_id).await?;
            match &delivery {
                Some(d) if !d.delivered => warn!(
                    settlement_id = %settlement_id,
                    attempts = d.attempts,
                    "Settlement notification left undelivered"
                ),
                None => warn!(
                    settlement_id = %settlement_id,
                    "Platform inactive, settlement notification held back"
                ),
                _ => {}
            }
            delivery
        } else {
            None
        };

        let id = settlement_id.to_string();
        let settlement =
            with_conn(&self.pool, move |conn| PlatformSettlement::find_by_id(conn, &id)).await?;
        Ok(SettlementCompletion {
            settlement,
            notification,
        })
    }

    /// Manually retry the notification of a finished settlement
    pub async fn redeliver(&self, settlement_id: &str) -> SettlementResult<DeliveryOutcome> {
        let id = settlement_id.to_string();
        let settlement =
            with_conn(&self.pool, move |conn| PlatformSettlement::find_by_id(conn, &id)).await?;
        if settlement.status == SettlementStatus::Received.as_str() {
            return Err(SettlementError::Validation(format!(
                "settlement {settlement_id} has not finished"
            )));
        }
        if settlement.webhook_delivered != 0 {
            return Err(SettlementError::Validation(format!(
                "settlement {settlement_id} was already delivered"
            )));
        }
        self.dispatcher
            .notify_settlement(settlement_id)
            .await?
            .ok_or_else(|| {
                SettlementError::Validation(format!(
                    "platform {} is inactive",
                    settlement.platform_id
                ))
            })
    }

    pub async fn list_undelivered(&self, platform_id: &str) -> SettlementResult<Vec<PlatformSettlement>> {
        let platform_id = platform_id.to_string();
        with_conn(&self.pool, move |conn| {
            PlatformSettlement::find_undelivered(conn, &platform_id)
        })
        .await
    }
}
