//! Append-only stake history

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tkoin_types::{StakeOperation, Tier, TkoinAmount};
use uuid::Uuid;

use crate::error::SettlementResult;
use crate::schema::stake_history;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = stake_history)]
pub struct StakeHistory {
    pub id: String,
    pub agent_id: String,
    pub stake_id: String,
    pub operation_type: String,
    pub amount: i64,
    pub penalty_amount: i64,
    pub previous_balance: i64,
    pub new_balance: i64,
    pub previous_tier: String,
    pub new_tier: String,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = stake_history)]
pub struct NewStakeHistory {
    pub id: String,
    pub agent_id: String,
    pub stake_id: String,
    pub operation_type: String,
    pub amount: i64,
    pub penalty_amount: i64,
    pub previous_balance: i64,
    pub new_balance: i64,
    pub previous_tier: String,
    pub new_tier: String,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
}

/// One stake or unstake movement
#[derive(Debug, Clone)]
pub struct StakeMovement<'a> {
    pub agent_id: &'a str,
    pub stake_id: &'a str,
    pub operation: StakeOperation,
    pub amount: TkoinAmount,
    pub penalty: TkoinAmount,
    pub previous_balance: TkoinAmount,
    pub new_balance: TkoinAmount,
    pub previous_tier: Tier,
    pub new_tier: Tier,
    pub note: Option<String>,
}

impl StakeHistory {
    pub fn append(conn: &mut SqliteConnection, movement: StakeMovement<'_>) -> SettlementResult<()> {
        let row = NewStakeHistory {
            id: Uuid::new_v4().to_string(),
            agent_id: movement.agent_id.to_string(),
            stake_id: movement.stake_id.to_string(),
            operation_type: movement.operation.as_str().to_string(),
            amount: movement.amount.base_units(),
            penalty_amount: movement.penalty.base_units(),
            previous_balance: movement.previous_balance.base_units(),
            new_balance: movement.new_balance.base_units(),
            previous_tier: movement.previous_tier.as_str().to_string(),
            new_tier: movement.new_tier.as_str().to_string(),
            note: movement.note,
            created_at: Utc::now().naive_utc(),
        };
        diesel::insert_into(stake_history::table)
            .values(&row)
            .execute(conn)?;
        Ok(())
    }

    /// Newest first
    pub fn find_by_agent(
        conn: &mut SqliteConnection,
        agent_id: &str,
        limit: i64,
    ) -> SettlementResult<Vec<StakeHistory>> {
        Ok(stake_history::table
            .filter(stake_history::agent_id.eq(agent_id))
            .order((stake_history::created_at.desc(), stake_history::id.desc()))
            .limit(limit)
            .load(conn)?)
    }
}
