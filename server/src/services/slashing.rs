//! Slashing governance
//!
//! `pending -> executed -> reversed`. Execution removes a severity-scaled
//! share of the agent's stake and lowers the tier accordingly; reversal
//! gives back exactly what was taken. Both claim the event with a
//! conditional status update so a second attempt cannot apply twice.

use diesel::SqliteConnection;
use tkoin_types::{SlashSeverity, SlashStatus, StakeStatus, TkoinAmount};
use tracing::{info, warn};

use crate::config::StakingConfig;
use crate::db::{with_conn, write_txn, DbPool};
use crate::error::{SettlementError, SettlementResult};
use crate::models::agent::Agent;
use crate::models::agent_stake::AgentStake;
use crate::models::audit_event::{event_types, Actor, AuditEventBuilder};
use crate::models::slashing_event::{NewSlashingEvent, SlashingEvent};
use crate::services::ledger;

/// Admin input for a new slashing event
#[derive(Debug, Clone)]
pub struct SlashRequest {
    pub agent_id: String,
    pub violation_type: String,
    pub severity: String,
    pub description: String,
    pub evidence_url: Option<String>,
}

impl SlashRequest {
    fn validate(&self) -> SettlementResult<SlashSeverity> {
        let severity: SlashSeverity = self.severity.parse()?;
        if self.violation_type.trim().is_empty() {
            return Err(SettlementError::Validation(
                "violation type is required".to_string(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(SettlementError::Validation(
                "description is required".to_string(),
            ));
        }
        if let Some(evidence) = &self.evidence_url {
            url::Url::parse(evidence)
                .map_err(|e| SettlementError::Validation(format!("invalid evidence url: {e}")))?;
        }
        Ok(severity)
    }
}

pub struct SlashingService {
    pool: DbPool,
    config: StakingConfig,
}

impl SlashingService {
    pub fn new(pool: DbPool, config: StakingConfig) -> Self {
        Self { pool, config }
    }

    /// Record a pending slashing event; no balance effect yet
    pub async fn create(&self, request: SlashRequest, actor: &Actor) -> SettlementResult<SlashingEvent> {
        let severity = request.validate()?;
        let actor = actor.clone();
        with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| {
                Agent::find_by_id(conn, &request.agent_id)?;
                let event = SlashingEvent::insert(
                    conn,
                    &NewSlashingEvent::new(
                        &request.agent_id,
                        request.violation_type.trim(),
                        severity,
                        request.description.trim(),
                        request.evidence_url.clone(),
                        &actor.id,
                    ),
                )?;
                AuditEventBuilder::new(event_types::SLASH_CREATED, &actor)
                    .entity("slashing_event", &event.id)
                    .metadata("agent_id", &event.agent_id)
                    .metadata("severity", severity.as_str())
                    .metadata("violation_type", &event.violation_type)
                    .append(conn)?;
                info!(
                    slash_id = %event.id,
                    agent_id = %event.agent_id,
                    severity = severity.as_str(),
                    "Slashing event created"
                );
                Ok(event)
            })
        })
        .await
    }

    /// Apply the penalty of a pending event
    pub async fn execute(&self, event_id: &str, actor: &Actor) -> SettlementResult<SlashingEvent> {
        let config = self.config.clone();
        let event_id = event_id.to_string();
        let actor = actor.clone();
        with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| execute_in_txn(conn, &config, &event_id, &actor))
        })
        .await
    }

    /// Undo an executed event; `reason` is mandatory
    pub async fn reverse(
        &self,
        event_id: &str,
        reason: &str,
        actor: &Actor,
    ) -> SettlementResult<SlashingEvent> {
        if reason.trim().is_empty() {
            return Err(SettlementError::Validation(
                "reversal reason is required".to_string(),
            ));
        }
        let config = self.config.clone();
        let event_id = event_id.to_string();
        let reason = reason.trim().to_string();
        let actor = actor.clone();
        with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| {
                reverse_in_txn(conn, &config, &event_id, &reason, &actor)
            })
        })
        .await
    }

    pub async fn get(&self, event_id: &str) -> SettlementResult<SlashingEvent> {
        let event_id = event_id.to_string();
        with_conn(&self.pool, move |conn| SlashingEvent::find_by_id(conn, &event_id)).await
    }

    pub async fn list_for_agent(&self, agent_id: &str) -> SettlementResult<Vec<SlashingEvent>> {
        let agent_id = agent_id.to_string();
        with_conn(&self.pool, move |conn| SlashingEvent::find_by_agent(conn, &agent_id)).await
    }

    pub async fn list_pending(&self) -> SettlementResult<Vec<SlashingEvent>> {
        with_conn(&self.pool, SlashingEvent::find_pending).await
    }
}

fn execute_in_txn(
    conn: &mut SqliteConnection,
    config: &StakingConfig,
    event_id: &str,
    actor: &Actor,
) -> SettlementResult<SlashingEvent> {
    let event = SlashingEvent::find_by_id(conn, event_id)?;
    event.slash_status()?.transition(SlashStatus::Executed)?;

    let severity = event.slash_severity()?;
    let agent = Agent::find_by_id(conn, &event.agent_id)?;
    let stake = AgentStake::find_or_create(conn, &event.agent_id)?;
    let current = stake.staked();
    let pct = config.slash_pct.for_severity(severity);
    let slashed = current.percent(pct);
    let remaining = current.saturating_sub(slashed);
    let previous_tier = agent.tier()?;
    let new_tier = config.thresholds.tier_for(remaining);

    if !SlashingEvent::claim_execution(conn, event_id, &actor.id, slashed, previous_tier, new_tier)? {
        return Err(SettlementError::conflict("slashing_event", event_id));
    }
    AgentStake::swap_amount(
        conn,
        &stake.id,
        current,
        remaining,
        new_tier,
        stake.locked_until,
        stake.status.parse::<StakeStatus>()?,
    )?;
    ledger::apply_tier(conn, &event.agent_id, new_tier, config.limits.limits_for(new_tier))?;
    AuditEventBuilder::new(event_types::SLASH_EXECUTED, actor)
        .entity("slashing_event", event_id)
        .metadata("agent_id", &event.agent_id)
        .metadata("severity", severity.as_str())
        .metadata("percent", pct)
        .metadata("slashed_amount", slashed.base_units())
        .metadata("previous_tier", previous_tier.as_str())
        .metadata("new_tier", new_tier.as_str())
        .append(conn)?;

    warn!(
        slash_id = %event_id,
        agent_id = %event.agent_id,
        slashed = slashed.base_units(),
        previous_tier = %previous_tier,
        new_tier = %new_tier,
        "Slash executed"
    );
    SlashingEvent::find_by_id(conn, event_id)
}

fn reverse_in_txn(
    conn: &mut SqliteConnection,
    config: &StakingConfig,
    event_id: &str,
    reason: &str,
    actor: &Actor,
) -> SettlementResult<SlashingEvent> {
    let event = SlashingEvent::find_by_id(conn, event_id)?;
    event.slash_status()?.transition(SlashStatus::Reversed)?;

    let slashed = TkoinAmount(event.slashed_amount.unwrap_or(0));
    let stake = AgentStake::find_or_create(conn, &event.agent_id)?;
    let current = stake.staked();
    let restored = current
        .checked_add(slashed)
        .ok_or_else(|| SettlementError::Internal("restored stake overflows".to_string()))?;
    let agent = Agent::find_by_id(conn, &event.agent_id)?;
    let previous_tier = agent.tier()?;
    let new_tier = config.thresholds.tier_for(restored);

    if !SlashingEvent::claim_reversal(conn, event_id, &actor.id, reason)? {
        return Err(SettlementError::conflict("slashing_event", event_id));
    }
    let status = if restored.is_positive() {
        StakeStatus::Active
    } else {
        stake.status.parse::<StakeStatus>()?
    };
    AgentStake::swap_amount(
        conn,
        &stake.id,
        current,
        restored,
        new_tier,
        stake.locked_until,
        status,
    )?;
    ledger::apply_tier(conn, &event.agent_id, new_tier, config.limits.limits_for(new_tier))?;
    AuditEventBuilder::new(event_types::SLASH_REVERSED, actor)
        .entity("slashing_event", event_id)
        .metadata("agent_id", &event.agent_id)
        .metadata("restored_amount", slashed.base_units())
        .metadata("reason", reason)
        .metadata("previous_tier", previous_tier.as_str())
        .metadata("new_tier", new_tier.as_str())
        .append(conn)?;

    info!(
        slash_id = %event_id,
        agent_id = %event.agent_id,
        restored = slashed.base_units(),
        new_tier = %new_tier,
        "Slash reversed"
    );
    SlashingEvent::find_by_id(conn, event_id)
}
