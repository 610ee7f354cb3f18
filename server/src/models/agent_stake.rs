//! Agent stake model
//!
//! One row per agent, created lazily on first stake and never deleted.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tkoin_types::{StakeStatus, Tier, TkoinAmount};
use uuid::Uuid;

use crate::error::{SettlementError, SettlementResult};
use crate::schema::agent_stakes;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = agent_stakes)]
pub struct AgentStake {
    pub id: String,
    pub agent_id: String,
    pub staked_amount: i64,
    pub current_tier: String,
    pub locked_until: Option<NaiveDateTime>,
    pub status: String,
    pub on_chain_balance: Option<i64>,
    pub last_synced_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = agent_stakes)]
pub struct NewAgentStake {
    pub id: String,
    pub agent_id: String,
    pub staked_amount: i64,
    pub current_tier: String,
    pub locked_until: Option<NaiveDateTime>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl AgentStake {
    pub fn find_by_agent(
        conn: &mut SqliteConnection,
        agent_id: &str,
    ) -> SettlementResult<Option<AgentStake>> {
        Ok(agent_stakes::table
            .filter(agent_stakes::agent_id.eq(agent_id))
            .first(conn)
            .optional()?)
    }

    /// Load the agent's stake row, creating an empty one on first use
    pub fn find_or_create(
        conn: &mut SqliteConnection,
        agent_id: &str,
    ) -> SettlementResult<AgentStake> {
        if let Some(stake) = Self::find_by_agent(conn, agent_id)? {
            return Ok(stake);
        }

        let now = Utc::now().naive_utc();
        let new_stake = NewAgentStake {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            staked_amount: 0,
            current_tier: Tier::Basic.as_str().to_string(),
            locked_until: None,
            status: StakeStatus::Active.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(agent_stakes::table)
            .values(&new_stake)
            .execute(conn)?;

        Self::find_by_agent(conn, agent_id)?
            .ok_or_else(|| SettlementError::Internal("stake row vanished after insert".into()))
    }

    /// Compare-and-swap the staked amount
    ///
    /// Only succeeds while `staked_amount` still equals `expected`; returns
    /// `ConcurrentConflict` otherwise.
    pub fn swap_amount(
        conn: &mut SqliteConnection,
        stake_id: &str,
        expected: TkoinAmount,
        new_amount: TkoinAmount,
        new_tier: Tier,
        locked_until: Option<NaiveDateTime>,
        status: StakeStatus,
    ) -> SettlementResult<()> {
        let updated = diesel::update(
            agent_stakes::table
                .filter(agent_stakes::id.eq(stake_id))
                .filter(agent_stakes::staked_amount.eq(expected.base_units())),
        )
        .set((
            agent_stakes::staked_amount.eq(new_amount.base_units()),
            agent_stakes::current_tier.eq(new_tier.as_str()),
            agent_stakes::locked_until.eq(locked_until),
            agent_stakes::status.eq(status.as_str()),
            agent_stakes::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

        if updated == 0 {
            return Err(SettlementError::conflict("agent_stake", stake_id));
        }
        Ok(())
    }

    /// Record the last observed on-chain balance
    pub fn record_on_chain_balance(
        conn: &mut SqliteConnection,
        stake_id: &str,
        balance: TkoinAmount,
    ) -> SettlementResult<()> {
        let now = Utc::now().naive_utc();
        diesel::update(agent_stakes::table.filter(agent_stakes::id.eq(stake_id)))
            .set((
                agent_stakes::on_chain_balance.eq(Some(balance.base_units())),
                agent_stakes::last_synced_at.eq(Some(now)),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn staked(&self) -> TkoinAmount {
        TkoinAmount(self.staked_amount)
    }

    pub fn tier(&self) -> SettlementResult<Tier> {
        Ok(self.current_tier.parse()?)
    }

    /// Whole days left in the lockup window, rounded up
    pub fn days_remaining(&self, now: NaiveDateTime) -> i64 {
        match self.locked_until {
            Some(until) if until > now => {
                let secs = (until - now).num_seconds();
                (secs + 86_399) / 86_400
            }
            _ => 0,
        }
    }

    pub fn is_locked(&self, now: NaiveDateTime) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }
}
