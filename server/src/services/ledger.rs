//! Ledger primitives
//!
//! The only code allowed to write `agents.tkoin_balance`,
//! `agents.locked_balance` and the tier/limit columns. Every balance change
//! is a single conditional UPDATE whose WHERE clause encodes the safety
//! condition, so `0 <= locked_balance <= tkoin_balance` holds at commit
//! time regardless of interleaving.

use chrono::Utc;
use diesel::prelude::*;
use tkoin_types::{Tier, TierLimits, TkoinAmount};
use tracing::{debug, warn};

use crate::db::{with_conn, DbPool};
use crate::error::{SettlementError, SettlementResult};
use crate::models::agent::Agent;
use crate::schema::agents;

fn ensure_positive(amount: TkoinAmount) -> SettlementResult<()> {
    if !amount.is_positive() {
        return Err(SettlementError::Validation(format!(
            "amount must be positive, got {}",
            amount.base_units()
        )));
    }
    Ok(())
}

/// Commit `amount` of the agent's available balance
///
/// `InsufficientBalance` when the balance observed before the update is too
/// small; `ConcurrentConflict` when it was large enough but the conditional
/// update matched no row because a concurrent writer got there first.
pub fn lock(conn: &mut SqliteConnection, agent_id: &str, amount: TkoinAmount) -> SettlementResult<()> {
    ensure_positive(amount)?;
    let agent = Agent::find_by_id(conn, agent_id)?;
    if agent.available() < amount {
        warn!(
            agent_id = %agent_id,
            available = agent.available().base_units(),
            requested = amount.base_units(),
            "Lock rejected: insufficient balance"
        );
        return Err(SettlementError::InsufficientBalance {
            agent_id: agent_id.to_string(),
            available: agent.available().base_units(),
            requested: amount.base_units(),
        });
    }

    let updated = diesel::update(
        agents::table
            .filter(agents::id.eq(agent_id))
            .filter((agents::tkoin_balance - agents::locked_balance).ge(amount.base_units())),
    )
    .set((
        agents::locked_balance.eq(agents::locked_balance + amount.base_units()),
        agents::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;

    if updated == 0 {
        warn!(agent_id = %agent_id, amount = amount.base_units(), "Lock lost a concurrent update");
        return Err(SettlementError::conflict("agent", agent_id));
    }
    debug!(agent_id = %agent_id, amount = amount.base_units(), "Balance locked");
    Ok(())
}

/// Release a previously locked amount
pub fn unlock(conn: &mut SqliteConnection, agent_id: &str, amount: TkoinAmount) -> SettlementResult<()> {
    ensure_positive(amount)?;
    let updated = diesel::update(
        agents::table
            .filter(agents::id.eq(agent_id))
            .filter(agents::locked_balance.ge(amount.base_units())),
    )
    .set((
        agents::locked_balance.eq(agents::locked_balance - amount.base_units()),
        agents::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;

    if updated == 0 {
        // Distinguish a missing agent from a locked balance that is too small
        Agent::find_by_id(conn, agent_id)?;
        warn!(agent_id = %agent_id, amount = amount.base_units(), "Unlock matched no row");
        return Err(SettlementError::ConcurrentUnlockConflict {
            agent_id: agent_id.to_string(),
            amount: amount.base_units(),
        });
    }
    debug!(agent_id = %agent_id, amount = amount.base_units(), "Balance unlocked");
    Ok(())
}

/// Settle a locked amount out of the agent's balance
///
/// Decrements both total and locked balance. Crediting the counterparty is
/// the caller's concern.
pub fn transfer(
    conn: &mut SqliteConnection,
    agent_id: &str,
    amount: TkoinAmount,
) -> SettlementResult<()> {
    ensure_positive(amount)?;
    let updated = diesel::update(
        agents::table
            .filter(agents::id.eq(agent_id))
            .filter(agents::locked_balance.ge(amount.base_units()))
            .filter(agents::tkoin_balance.ge(amount.base_units())),
    )
    .set((
        agents::tkoin_balance.eq(agents::tkoin_balance - amount.base_units()),
        agents::locked_balance.eq(agents::locked_balance - amount.base_units()),
        agents::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;

    if updated == 0 {
        Agent::find_by_id(conn, agent_id)?;
        warn!(agent_id = %agent_id, amount = amount.base_units(), "Transfer matched no row");
        return Err(SettlementError::conflict("agent", agent_id));
    }
    debug!(agent_id = %agent_id, amount = amount.base_units(), "Locked balance transferred out");
    Ok(())
}

/// Write the agent's tier and the limits that come with it
pub fn apply_tier(
    conn: &mut SqliteConnection,
    agent_id: &str,
    tier: Tier,
    limits: TierLimits,
) -> SettlementResult<()> {
    let updated = diesel::update(agents::table.filter(agents::id.eq(agent_id)))
        .set((
            agents::verification_tier.eq(tier.as_str()),
            agents::daily_limit.eq(limits.daily_limit),
            agents::monthly_limit.eq(limits.monthly_limit),
            agents::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    if updated == 0 {
        return Err(SettlementError::not_found("agent", agent_id));
    }
    Ok(())
}

/// Async front for callers outside a transaction
#[derive(Clone)]
pub struct LedgerService {
    pool: DbPool,
}

impl LedgerService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn lock(&self, agent_id: &str, amount: TkoinAmount) -> SettlementResult<()> {
        let agent_id = agent_id.to_string();
        with_conn(&self.pool, move |conn| lock(conn, &agent_id, amount)).await
    }

    pub async fn unlock(&self, agent_id: &str, amount: TkoinAmount) -> SettlementResult<()> {
        let agent_id = agent_id.to_string();
        with_conn(&self.pool, move |conn| unlock(conn, &agent_id, amount)).await
    }

    pub async fn transfer(&self, agent_id: &str, amount: TkoinAmount) -> SettlementResult<()> {
        let agent_id = agent_id.to_string();
        with_conn(&self.pool, move |conn| transfer(conn, &agent_id, amount)).await
    }

    pub async fn get_agent(&self, agent_id: &str) -> SettlementResult<Agent> {
        let agent_id = agent_id.to_string();
        with_conn(&self.pool, move |conn| Agent::find_by_id(conn, &agent_id)).await
    }
}
