//! Agent model: identity and ledger root
//!
//! Balances are read here but only written through `services::ledger`.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tkoin_types::{AgentStatus, Tier, TierLimits, TkoinAmount};
use uuid::Uuid;

use crate::error::{SettlementError, SettlementResult};
use crate::schema::agents;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = agents)]
pub struct Agent {
    pub id: String,
    pub wallet_address: String,
    pub tkoin_balance: i64,
    pub locked_balance: i64,
    pub verification_tier: String,
    pub daily_limit: i64,
    pub monthly_limit: i64,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = agents)]
pub struct NewAgent {
    pub id: String,
    pub wallet_address: String,
    pub tkoin_balance: i64,
    pub locked_balance: i64,
    pub verification_tier: String,
    pub daily_limit: i64,
    pub monthly_limit: i64,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Agent {
    /// Register an active agent at the basic tier
    pub fn register(
        conn: &mut SqliteConnection,
        wallet_address: &str,
        initial_balance: TkoinAmount,
        basic_limits: TierLimits,
    ) -> SettlementResult<Agent> {
        if wallet_address.trim().is_empty() {
            return Err(SettlementError::Validation(
                "wallet address is required".to_string(),
            ));
        }
        if initial_balance.base_units() < 0 {
            return Err(SettlementError::Validation(
                "initial balance must not be negative".to_string(),
            ));
        }

        let now = Utc::now().naive_utc();
        let new_agent = NewAgent {
            id: Uuid::new_v4().to_string(),
            wallet_address: wallet_address.trim().to_string(),
            tkoin_balance: initial_balance.base_units(),
            locked_balance: 0,
            verification_tier: Tier::Basic.as_str().to_string(),
            daily_limit: basic_limits.daily_limit,
            monthly_limit: basic_limits.monthly_limit,
            status: AgentStatus::Active.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(agents::table)
            .values(&new_agent)
            .execute(conn)?;

        Self::find_by_id(conn, &new_agent.id)
    }

    pub fn find_by_id(conn: &mut SqliteConnection, agent_id: &str) -> SettlementResult<Agent> {
        agents::table
            .filter(agents::id.eq(agent_id))
            .first(conn)
            .optional()?
            .ok_or_else(|| SettlementError::not_found("agent", agent_id))
    }

    pub fn find_by_wallet(
        conn: &mut SqliteConnection,
        wallet_address: &str,
    ) -> SettlementResult<Option<Agent>> {
        Ok(agents::table
            .filter(agents::wallet_address.eq(wallet_address))
            .first(conn)
            .optional()?)
    }

    /// Change the agent's lifecycle status
    pub fn set_status(
        conn: &mut SqliteConnection,
        agent_id: &str,
        status: AgentStatus,
    ) -> SettlementResult<()> {
        let updated = diesel::update(agents::table.filter(agents::id.eq(agent_id)))
            .set((
                agents::status.eq(status.as_str()),
                agents::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        if updated == 0 {
            return Err(SettlementError::not_found("agent", agent_id));
        }
        Ok(())
    }

    /// Unlocked part of the balance
    pub fn available(&self) -> TkoinAmount {
        TkoinAmount(self.tkoin_balance - self.locked_balance)
    }

    pub fn tier(&self) -> SettlementResult<Tier> {
        Ok(self.verification_tier.parse()?)
    }

    pub fn agent_status(&self) -> SettlementResult<AgentStatus> {
        Ok(self.status.parse()?)
    }

    pub fn is_revoked(&self) -> bool {
        self.status == AgentStatus::Revoked.as_str()
    }

    /// Reject agents that may not take on new commitments
    pub fn ensure_active(&self) -> SettlementResult<()> {
        match self.agent_status()? {
            AgentStatus::Active => Ok(()),
            other => Err(SettlementError::Validation(format!(
                "agent {} is {}",
                self.id,
                other.as_str()
            ))),
        }
    }
}
