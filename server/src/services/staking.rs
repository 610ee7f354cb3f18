//! Staking engine
//!
//! Stakes are database bookkeeping validated against the on-chain balance
//! at stake time. Each stake or unstake updates the stake row (compare and
//! swap on the previous amount), appends a history row, rewrites the
//! agent's tier and limits and appends an audit event, all in one
//! immediate transaction.

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::SqliteConnection;
use serde::Serialize;
use std::sync::Arc;
use tkoin_types::{StakeOperation, StakeStatus, Tier, TkoinAmount};
use tracing::{info, warn};

use crate::config::StakingConfig;
use crate::db::{with_conn, write_txn, DbPool};
use crate::error::{SettlementError, SettlementResult};
use crate::models::agent::Agent;
use crate::models::agent_stake::AgentStake;
use crate::models::audit_event::{event_types, Actor, AuditEventBuilder};
use crate::models::stake_history::{StakeHistory, StakeMovement};
use crate::services::chain::OnChainBalanceReader;
use crate::services::ledger;

/// Result of a successful stake
#[derive(Debug, Clone, Serialize)]
pub struct StakeOutcome {
    pub staked_amount: TkoinAmount,
    pub previous_tier: Tier,
    pub new_tier: Tier,
    pub locked_until: NaiveDateTime,
}

impl StakeOutcome {
    pub fn tier_changed(&self) -> bool {
        self.previous_tier != self.new_tier
    }
}

/// Result of a successful unstake
#[derive(Debug, Clone, Serialize)]
pub struct UnstakeOutcome {
    /// Amount removed from the stake
    pub requested: TkoinAmount,
    /// Withheld on a forced unstake inside the lockup window
    pub penalty: TkoinAmount,
    /// Amount released to the agent (`requested - penalty`)
    pub final_amount: TkoinAmount,
    pub staked_amount: TkoinAmount,
    pub previous_tier: Tier,
    pub new_tier: Tier,
}

/// Read-only stake projection
#[derive(Debug, Clone, Serialize)]
pub struct StakeInfo {
    pub agent_id: String,
    pub staked_amount: TkoinAmount,
    pub current_tier: Tier,
    pub status: StakeStatus,
    pub locked_until: Option<NaiveDateTime>,
    pub is_locked: bool,
    pub days_remaining: i64,
    pub next_tier: Option<Tier>,
    pub tokens_needed: Option<TkoinAmount>,
    pub on_chain_balance: Option<TkoinAmount>,
}

pub struct StakingService {
    pool: DbPool,
    config: StakingConfig,
    chain: Arc<dyn OnChainBalanceReader>,
}

impl StakingService {
    pub fn new(pool: DbPool, config: StakingConfig, chain: Arc<dyn OnChainBalanceReader>) -> Self {
        Self {
            pool,
            config,
            chain,
        }
    }

    /// Stake `amount_tokens` TKOIN for the agent owning `wallet`
    pub async fn stake(
        &self,
        agent_id: &str,
        wallet: &str,
        amount_tokens: f64,
    ) -> SettlementResult<StakeOutcome> {
        let amount = TkoinAmount::from_tokens(amount_tokens)?;
        if amount < self.config.min_stake {
            return Err(SettlementError::Validation(format!(
                "minimum stake is {}, got {}",
                self.config.min_stake, amount
            )));
        }

        let agent = {
            let agent_id = agent_id.to_string();
            with_conn(&self.pool, move |conn| Agent::find_by_id(conn, &agent_id)).await?
        };
        agent.ensure_active()?;
        if agent.wallet_address != wallet {
            return Err(SettlementError::Validation(
                "wallet does not belong to agent".to_string(),
            ));
        }

        // Read outside the transaction; the oracle is a network call
        let on_chain = self.chain.available_balance(wallet).await?;

        let config = self.config.clone();
        let agent_id = agent_id.to_string();
        with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| stake_in_txn(conn, &config, &agent_id, amount, on_chain))
        })
        .await
    }

    /// Withdraw `amount_tokens` from the agent's stake
    ///
    /// Inside the lockup window this fails with `StakeLocked` unless
    /// `force` is set, in which case the configured penalty is withheld.
    pub async fn unstake(
        &self,
        agent_id: &str,
        amount_tokens: f64,
        force: bool,
    ) -> SettlementResult<UnstakeOutcome> {
        let amount = TkoinAmount::from_tokens(amount_tokens)?;
        if !amount.is_positive() {
            return Err(SettlementError::Validation(
                "unstake amount must be positive".to_string(),
            ));
        }

        let config = self.config.clone();
        let agent_id = agent_id.to_string();
        with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| unstake_in_txn(conn, &config, &agent_id, amount, force))
        })
        .await
    }

    pub async fn get_stake_info(&self, agent_id: &str) -> SettlementResult<StakeInfo> {
        let thresholds = self.config.thresholds;
        let agent_id = agent_id.to_string();
        with_conn(&self.pool, move |conn| {
            Agent::find_by_id(conn, &agent_id)?;
            let now = Utc::now().naive_utc();
            let stake = AgentStake::find_by_agent(conn, &agent_id)?;

            let staked = stake.as_ref().map(AgentStake::staked).unwrap_or_default();
            let next = thresholds.next_tier(staked);
            Ok(StakeInfo {
                agent_id: agent_id.clone(),
                staked_amount: staked,
                current_tier: thresholds.tier_for(staked),
                status: match &stake {
                    Some(s) => s.status.parse()?,
                    None => StakeStatus::Active,
                },
                locked_until: stake.as_ref().and_then(|s| s.locked_until),
                is_locked: stake.as_ref().map(|s| s.is_locked(now)).unwrap_or(false),
                days_remaining: stake.as_ref().map(|s| s.days_remaining(now)).unwrap_or(0),
                next_tier: next.map(|(tier, _)| tier),
                tokens_needed: next.map(|(_, distance)| distance),
                on_chain_balance: stake
                    .as_ref()
                    .and_then(|s| s.on_chain_balance)
                    .map(TkoinAmount),
            })
        })
        .await
    }

    /// Stake history, newest first
    pub async fn history(&self, agent_id: &str, limit: i64) -> SettlementResult<Vec<StakeHistory>> {
        let agent_id = agent_id.to_string();
        let limit = limit.clamp(1, 500);
        with_conn(&self.pool, move |conn| {
            StakeHistory::find_by_agent(conn, &agent_id, limit)
        })
        .await
    }

    /// Record the agent's current on-chain balance on the stake row
    ///
    /// Best effort reconciliation: never changes `staked_amount`.
    pub async fn sync_on_chain_balance(&self, agent_id: &str) -> SettlementResult<TkoinAmount> {
        let agent = {
            let agent_id = agent_id.to_string();
            with_conn(&self.pool, move |conn| Agent::find_by_id(conn, &agent_id)).await?
        };
        let balance = match self.chain.available_balance(&agent.wallet_address).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(agent_id = %agent.id, error = %e, "On-chain balance sync failed");
                return Err(e);
            }
        };

        let agent_id = agent.id.clone();
        with_conn(&self.pool, move |conn| {
            if let Some(stake) = AgentStake::find_by_agent(conn, &agent_id)? {
                AgentStake::record_on_chain_balance(conn, &stake.id, balance)?;
            }
            Ok(())
        })
        .await?;
        info!(agent_id = %agent.id, balance = balance.base_units(), "On-chain balance synced");
        Ok(balance)
    }
}

fn stake_in_txn(
    conn: &mut SqliteConnection,
    config: &StakingConfig,
    agent_id: &str,
    amount: TkoinAmount,
    on_chain: TkoinAmount,
) -> SettlementResult<StakeOutcome> {
    let agent = Agent::find_by_id(conn, agent_id)?;
    agent.ensure_active()?;
    let stake = AgentStake::find_or_create(conn, agent_id)?;
    let current = stake.staked();
    let new_staked = current
        .checked_add(amount)
        .ok_or_else(|| SettlementError::Validation("stake amount overflows".to_string()))?;

    // Nothing moves on-chain at stake time, so the wallet must cover the
    // whole stake, not just the increment
    if on_chain < new_staked {
        warn!(
            agent_id = %agent_id,
            on_chain = on_chain.base_units(),
            requested_total = new_staked.base_units(),
            "Stake rejected: on-chain balance too low"
        );
        return Err(SettlementError::InsufficientBalance {
            agent_id: agent_id.to_string(),
            available: on_chain.saturating_sub(current).base_units(),
            requested: amount.base_units(),
        });
    }

    let previous_tier = agent.tier()?;
    let new_tier = config.thresholds.tier_for(new_staked);
    let locked_until = Utc::now().naive_utc() + Duration::days(config.lockup_days);

    AgentStake::swap_amount(
        conn,
        &stake.id,
        current,
        new_staked,
        new_tier,
        Some(locked_until),
        StakeStatus::Active,
    )?;
    StakeHistory::append(
        conn,
        StakeMovement {
            agent_id,
            stake_id: &stake.id,
            operation: StakeOperation::Stake,
            amount,
            penalty: TkoinAmount::ZERO,
            previous_balance: current,
            new_balance: new_staked,
            previous_tier,
            new_tier,
            note: None,
        },
    )?;
    ledger::apply_tier(conn, agent_id, new_tier, config.limits.limits_for(new_tier))?;
    AuditEventBuilder::new(event_types::STAKE_CREATED, &Actor::agent(agent_id))
        .entity("agent_stake", &stake.id)
        .metadata("amount", amount.base_units())
        .metadata("previous_balance", current.base_units())
        .metadata("new_balance", new_staked.base_units())
        .metadata("previous_tier", previous_tier.as_str())
        .metadata("new_tier", new_tier.as_str())
        .append(conn)?;

    info!(
        agent_id = %agent_id,
        amount = amount.base_units(),
        staked = new_staked.base_units(),
        previous_tier = %previous_tier,
        new_tier = %new_tier,
        "Stake recorded"
    );
    Ok(StakeOutcome {
        staked_amount: new_staked,
        previous_tier,
        new_tier,
        locked_until,
    })
}

fn unstake_in_txn(
    conn: &mut SqliteConnection,
    config: &StakingConfig,
    agent_id: &str,
    amount: TkoinAmount,
    force: bool,
) -> SettlementResult<UnstakeOutcome> {
    let agent = Agent::find_by_id(conn, agent_id)?;
    let stake = AgentStake::find_by_agent(conn, agent_id)?.ok_or(
        SettlementError::InsufficientStakedBalance {
            staked: 0,
            requested: amount.base_units(),
        },
    )?;
    let current = stake.staked();
    if amount > current {
        return Err(SettlementError::InsufficientStakedBalance {
            staked: current.base_units(),
            requested: amount.base_units(),
        });
    }

    let now = Utc::now().naive_utc();
    let in_lockup = stake.is_locked(now);
    if in_lockup && !force {
        let days_remaining = stake.days_remaining(now);
        return Err(SettlementError::StakeLocked {
            days_remaining,
            locked_until: stake.locked_until.unwrap_or(now),
        });
    }

    let penalty = if in_lockup {
        amount.percent(config.early_unstake_penalty_pct)
    } else {
        TkoinAmount::ZERO
    };
    let final_amount = amount.saturating_sub(penalty);
    let new_staked = current.saturating_sub(amount);
    let previous_tier = agent.tier()?;
    let new_tier = config.thresholds.tier_for(new_staked);
    let status = if new_staked.is_positive() {
        StakeStatus::Active
    } else {
        StakeStatus::Unstaking
    };

    AgentStake::swap_amount(
        conn,
        &stake.id,
        current,
        new_staked,
        new_tier,
        stake.locked_until,
        status,
    )?;
    StakeHistory::append(
        conn,
        StakeMovement {
            agent_id,
            stake_id: &stake.id,
            operation: StakeOperation::Unstake,
            amount,
            penalty,
            previous_balance: current,
            new_balance: new_staked,
            previous_tier,
            new_tier,
            note: in_lockup.then(|| {
                format!(
                    "forced unstake during lockup, {}% penalty",
                    config.early_unstake_penalty_pct
                )
            }),
        },
    )?;
    ledger::apply_tier(conn, agent_id, new_tier, config.limits.limits_for(new_tier))?;
    AuditEventBuilder::new(event_types::STAKE_WITHDRAWN, &Actor::agent(agent_id))
        .entity("agent_stake", &stake.id)
        .metadata("amount", amount.base_units())
        .metadata("penalty", penalty.base_units())
        .metadata("forced", in_lockup)
        .metadata("previous_tier", previous_tier.as_str())
        .metadata("new_tier", new_tier.as_str())
        .append(conn)?;

    info!(
        agent_id = %agent_id,
        amount = amount.base_units(),
        penalty = penalty.base_units(),
        staked = new_staked.base_units(),
        new_tier = %new_tier,
        "Unstake recorded"
    );
    Ok(UnstakeOutcome {
        requested: amount,
        penalty,
        final_amount,
        staked_amount: new_staked,
        previous_tier,
        new_tier,
    })
}
