//! Slashing governance records

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tkoin_types::{SlashSeverity, SlashStatus, Tier, TkoinAmount};
use uuid::Uuid;

use crate::error::{SettlementError, SettlementResult};
use crate::schema::slashing_events;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = slashing_events)]
pub struct SlashingEvent {
    pub id: String,
    pub agent_id: String,
    pub violation_type: String,
    pub severity: String,
    pub description: String,
    pub evidence_url: Option<String>,
    pub status: String,
    pub slashed_amount: Option<i64>,
    pub previous_tier: Option<String>,
    pub new_tier: Option<String>,
    pub created_by: String,
    pub executed_by: Option<String>,
    pub executed_at: Option<NaiveDateTime>,
    pub reversed_by: Option<String>,
    pub reversal_reason: Option<String>,
    pub reversed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = slashing_events)]
pub struct NewSlashingEvent {
    pub id: String,
    pub agent_id: String,
    pub violation_type: String,
    pub severity: String,
    pub description: String,
    pub evidence_url: Option<String>,
    pub status: String,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl NewSlashingEvent {
    pub fn new(
        agent_id: &str,
        violation_type: &str,
        severity: SlashSeverity,
        description: &str,
        evidence_url: Option<String>,
        created_by: &str,
    ) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            violation_type: violation_type.to_string(),
            severity: severity.as_str().to_string(),
            description: description.to_string(),
            evidence_url,
            status: SlashStatus::Pending.as_str().to_string(),
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl SlashingEvent {
    pub fn insert(
        conn: &mut SqliteConnection,
        new_event: &NewSlashingEvent,
    ) -> SettlementResult<SlashingEvent> {
        diesel::insert_into(slashing_events::table)
            .values(new_event)
            .execute(conn)?;
        Self::find_by_id(conn, &new_event.id)
    }

    pub fn find_by_id(conn: &mut SqliteConnection, id: &str) -> SettlementResult<SlashingEvent> {
        slashing_events::table
            .filter(slashing_events::id.eq(id))
            .first(conn)
            .optional()?
            .ok_or_else(|| SettlementError::not_found("slashing_event", id))
    }

    pub fn find_by_agent(
        conn: &mut SqliteConnection,
        agent_id: &str,
    ) -> SettlementResult<Vec<SlashingEvent>> {
        Ok(slashing_events::table
            .filter(slashing_events::agent_id.eq(agent_id))
            .order(slashing_events::created_at.desc())
            .load(conn)?)
    }

    pub fn find_pending(conn: &mut SqliteConnection) -> SettlementResult<Vec<SlashingEvent>> {
        Ok(slashing_events::table
            .filter(slashing_events::status.eq(SlashStatus::Pending.as_str()))
            .order(slashing_events::created_at.asc())
            .load(conn)?)
    }

    /// Claim a pending event for execution
    ///
    /// Returns false if another caller already moved it out of `pending`.
    pub fn claim_execution(
        conn: &mut SqliteConnection,
        id: &str,
        executed_by: &str,
        slashed: TkoinAmount,
        previous_tier: Tier,
        new_tier: Tier,
    ) -> SettlementResult<bool> {
        let now = Utc::now().naive_utc();
        let updated = diesel::update(
            slashing_events::table
                .filter(slashing_events::id.eq(id))
                .filter(slashing_events::status.eq(SlashStatus::Pending.as_str())),
        )
        .set((
            slashing_events::status.eq(SlashStatus::Executed.as_str()),
            slashing_events::slashed_amount.eq(Some(slashed.base_units())),
            slashing_events::previous_tier.eq(Some(previous_tier.as_str())),
            slashing_events::new_tier.eq(Some(new_tier.as_str())),
            slashing_events::executed_by.eq(Some(executed_by)),
            slashing_events::executed_at.eq(Some(now)),
            slashing_events::updated_at.eq(now),
        ))
        .execute(conn)?;
        Ok(updated == 1)
    }

    /// Claim an executed event for reversal
    pub fn claim_reversal(
        conn: &mut SqliteConnection,
        id: &str,
        reversed_by: &str,
        reason: &str,
    ) -> SettlementResult<bool> {
        let now = Utc::now().naive_utc();
        let updated = diesel::update(
            slashing_events::table
                .filter(slashing_events::id.eq(id))
                .filter(slashing_events::status.eq(SlashStatus::Executed.as_str())),
        )
        .set((
            slashing_events::status.eq(SlashStatus::Reversed.as_str()),
            slashing_events::reversed_by.eq(Some(reversed_by)),
            slashing_events::reversal_reason.eq(Some(reason)),
            slashing_events::reversed_at.eq(Some(now)),
            slashing_events::updated_at.eq(now),
        ))
        .execute(conn)?;
        Ok(updated == 1)
    }

    pub fn slash_status(&self) -> SettlementResult<SlashStatus> {
        Ok(self.status.parse()?)
    }

    pub fn slash_severity(&self) -> SettlementResult<SlashSeverity> {
        Ok(self.severity.parse()?)
    }
}
