//! Burn governance
//!
//! The proposed burn is `treasury_balance * burn_rate_bps`. A proposal is
//! only persisted if the amount passes every safety limit; otherwise the
//! call fails with `SafetyLimitViolation` and nothing is written.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tkoin_types::{BurnStatus, TkoinAmount};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BurnSafetyConfig;
use crate::db::{with_conn, write_txn, DbPool};
use crate::error::{SettlementError, SettlementResult};
use crate::models::audit_event::{event_types, Actor, AuditEventBuilder};
use crate::models::burn_proposal::{BurnProposal, NewBurnProposal};
use crate::services::chain::{TreasuryOracle, TreasurySnapshot};

/// Deterministic burn sizing for one treasury snapshot
#[derive(Debug, Clone, Serialize)]
pub struct BurnCalculation {
    pub treasury_wallet: String,
    pub snapshot: TreasurySnapshot,
    pub burn_rate_bps: u32,
    pub proposed_amount: TkoinAmount,
}

/// Size a burn from a snapshot
pub fn calculate_burn_amount(snapshot: &TreasurySnapshot, burn_rate_bps: u32) -> TkoinAmount {
    snapshot.treasury_balance.bps(burn_rate_bps)
}

/// Check a proposed amount against the configured limits
///
/// `window_total` is the sum of proposals already counted in the rolling
/// window.
pub fn check_safety_limits(
    config: &BurnSafetyConfig,
    amount: TkoinAmount,
    snapshot: &TreasurySnapshot,
    window_total: TkoinAmount,
) -> SettlementResult<()> {
    if amount < config.min_amount {
        return Err(SettlementError::SafetyLimitViolation(format!(
            "burn of {} is below the minimum of {}",
            amount, config.min_amount
        )));
    }
    if amount > config.max_amount {
        return Err(SettlementError::SafetyLimitViolation(format!(
            "burn of {} exceeds the maximum of {}",
            amount, config.max_amount
        )));
    }
    if amount > snapshot.treasury_balance {
        return Err(SettlementError::SafetyLimitViolation(format!(
            "burn of {} exceeds the treasury balance of {}",
            amount, snapshot.treasury_balance
        )));
    }
    let supply_cap = snapshot.total_supply.bps(config.max_supply_bps);
    if amount > supply_cap {
        return Err(SettlementError::SafetyLimitViolation(format!(
            "burn of {} exceeds {} bps of total supply ({})",
            amount, config.max_supply_bps, supply_cap
        )));
    }
    let period_cap = snapshot.total_supply.bps(config.max_period_bps);
    let period_total = window_total.checked_add(amount).unwrap_or(TkoinAmount(i64::MAX));
    if period_total > period_cap {
        return Err(SettlementError::SafetyLimitViolation(format!(
            "burns in the last {} days would total {}, above the cap of {}",
            config.rate_window_days, period_total, period_cap
        )));
    }
    Ok(())
}

pub struct BurnService {
    pool: DbPool,
    config: BurnSafetyConfig,
    oracle: Arc<dyn TreasuryOracle>,
}

impl BurnService {
    pub fn new(pool: DbPool, config: BurnSafetyConfig, oracle: Arc<dyn TreasuryOracle>) -> Self {
        Self {
            pool,
            config,
            oracle,
        }
    }

    /// Compute the proposed burn without writing anything
    pub async fn calculate_proposed_burn(
        &self,
        treasury_wallet: &str,
    ) -> SettlementResult<BurnCalculation> {
        if treasury_wallet.trim().is_empty() {
            return Err(SettlementError::Validation(
                "treasury wallet is required".to_string(),
            ));
        }
        let snapshot = self.oracle.snapshot(treasury_wallet).await?;
        Ok(BurnCalculation {
            treasury_wallet: treasury_wallet.to_string(),
            proposed_amount: calculate_burn_amount(&snapshot, self.config.burn_rate_bps),
            burn_rate_bps: self.config.burn_rate_bps,
            snapshot,
        })
    }

    /// Recompute the burn and persist it as a pending proposal
    pub async fn create_proposal(
        &self,
        reason: &str,
        treasury_wallet: &str,
        actor: &Actor,
    ) -> SettlementResult<BurnProposal> {
        if reason.trim().is_empty() {
            return Err(SettlementError::Validation(
                "burn reason is required".to_string(),
            ));
        }
        let calculation = self.calculate_proposed_burn(treasury_wallet).await?;

        let config = self.config.clone();
        let reason = reason.trim().to_string();
        let actor = actor.clone();
        with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| {
                let since = Utc::now().naive_utc() - Duration::days(config.rate_window_days);
                let window_total = TkoinAmount(BurnProposal::window_total(conn, since)?);
                let amount = calculation.proposed_amount;

                if let Err(e) = check_safety_limits(&config, amount, &calculation.snapshot, window_total) {
                    warn!(
                        treasury_wallet = %crate::log_wallet!(&calculation.treasury_wallet),
                        amount = amount.base_units(),
                        window_total = window_total.base_units(),
                        error = %e,
                        "Burn proposal rejected by safety limits"
                    );
                    return Err(e);
                }

                let now = Utc::now().naive_utc();
                let proposal = BurnProposal::insert(
                    conn,
                    &NewBurnProposal {
                        id: Uuid::new_v4().to_string(),
                        proposed_by: actor.id.clone(),
                        reason: reason.clone(),
                        treasury_wallet: calculation.treasury_wallet.clone(),
                        calculated_amount: amount.base_units(),
                        treasury_balance: calculation.snapshot.treasury_balance.base_units(),
                        total_supply: calculation.snapshot.total_supply.base_units(),
                        circulating_supply: calculation.snapshot.circulating_supply.base_units(),
                        status: BurnStatus::Pending.as_str().to_string(),
                        created_at: now,
                        updated_at: now,
                    },
                )?;
                AuditEventBuilder::new(event_types::BURN_PROPOSED, &actor)
                    .entity("burn_proposal", &proposal.id)
                    .metadata("calculated_amount", amount.base_units())
                    .metadata("treasury_balance", proposal.treasury_balance)
                    .metadata("burn_rate_bps", calculation.burn_rate_bps)
                    .append(conn)?;

                info!(
                    proposal_id = %proposal.id,
                    amount = amount.base_units(),
                    "Burn proposal created"
                );
                Ok(proposal)
            })
        })
        .await
    }

    pub async fn approve_proposal(
        &self,
        proposal_id: &str,
        actor: &Actor,
        note: Option<&str>,
    ) -> SettlementResult<BurnProposal> {
        self.review(proposal_id, BurnStatus::Approved, actor, note).await
    }

    pub async fn reject_proposal(
        &self,
        proposal_id: &str,
        actor: &Actor,
        note: Option<&str>,
    ) -> SettlementResult<BurnProposal> {
        self.review(proposal_id, BurnStatus::Rejected, actor, note).await
    }

    async fn review(
        &self,
        proposal_id: &str,
        outcome: BurnStatus,
        actor: &Actor,
        note: Option<&str>,
    ) -> SettlementResult<BurnProposal> {
        let proposal_id = proposal_id.to_string();
        let actor = actor.clone();
        let note = note.map(str::to_string);
        with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| {
                let proposal = BurnProposal::find_by_id(conn, &proposal_id)?;
                proposal.burn_status()?.transition(outcome)?;
                if !BurnProposal::review(conn, &proposal_id, outcome, &actor.id, note.as_deref())? {
                    return Err(SettlementError::conflict("burn_proposal", &proposal_id));
                }
                let event_type = match outcome {
                    BurnStatus::Approved => event_types::BURN_APPROVED,
                    _ => event_types::BURN_REJECTED,
                };
                AuditEventBuilder::new(event_type, &actor)
                    .entity("burn_proposal", &proposal_id)
                    .metadata("calculated_amount", proposal.calculated_amount)
                    .metadata("note", &note)
                    .append(conn)?;
                info!(proposal_id = %proposal_id, outcome = outcome.as_str(), "Burn proposal reviewed");
                BurnProposal::find_by_id(conn, &proposal_id)
            })
        })
        .await
    }

    /// Record the out-of-band on-chain burn of an approved proposal
    pub async fn mark_executed(
        &self,
        proposal_id: &str,
        tx_signature: &str,
        actor: &Actor,
    ) -> SettlementResult<BurnProposal> {
        if tx_signature.trim().is_empty() {
            return Err(SettlementError::Validation(
                "transaction signature is required".to_string(),
            ));
        }
        let proposal_id = proposal_id.to_string();
        let tx_signature = tx_signature.trim().to_string();
        let actor = actor.clone();
        with_conn(&self.pool, move |conn| {
            write_txn(conn, |conn| {
                let proposal = BurnProposal::find_by_id(conn, &proposal_id)?;
                proposal.burn_status()?.transition(BurnStatus::Executed)?;
                if !BurnProposal::record_execution(conn, &proposal_id, &actor.id, &tx_signature)? {
                    return Err(SettlementError::conflict("burn_proposal", &proposal_id));
                }
                AuditEventBuilder::new(event_types::BURN_EXECUTED, &actor)
                    .entity("burn_proposal", &proposal_id)
                    .metadata("calculated_amount", proposal.calculated_amount)
                    .metadata("tx_signature", &tx_signature)
                    .append(conn)?;
                info!(
                    proposal_id = %proposal_id,
                    tx_signature = %crate::log_signature!(&tx_signature),
                    "Burn proposal executed"
                );
                BurnProposal::find_by_id(conn, &proposal_id)
            })
        })
        .await
    }

    pub async fn get_proposal(&self, proposal_id: &str) -> SettlementResult<BurnProposal> {
        let proposal_id = proposal_id.to_string();
        with_conn(&self.pool, move |conn| BurnProposal::find_by_id(conn, &proposal_id)).await
    }

    pub async fn list_proposals(
        &self,
        status: Option<BurnStatus>,
        limit: i64,
    ) -> SettlementResult<Vec<BurnProposal>> {
        let limit = limit.clamp(1, 500);
        with_conn(&self.pool, move |conn| BurnProposal::list(conn, status, limit)).await
    }
}
