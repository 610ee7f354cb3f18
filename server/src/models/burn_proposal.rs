//! Burn proposal records

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tkoin_types::BurnStatus;

use crate::error::{SettlementError, SettlementResult};
use crate::schema::burn_proposals;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = burn_proposals)]
pub struct BurnProposal {
    pub id: String,
    pub proposed_by: String,
    pub reason: String,
    pub treasury_wallet: String,
    pub calculated_amount: i64,
    pub treasury_balance: i64,
    pub total_supply: i64,
    pub circulating_supply: i64,
    pub status: String,
    pub reviewed_by: Option<String>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub executed_by: Option<String>,
    pub execution_signature: Option<String>,
    pub executed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = burn_proposals)]
pub struct NewBurnProposal {
    pub id: String,
    pub proposed_by: String,
    pub reason: String,
    pub treasury_wallet: String,
    pub calculated_amount: i64,
    pub treasury_balance: i64,
    pub total_supply: i64,
    pub circulating_supply: i64,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BurnProposal {
    pub fn insert(
        conn: &mut SqliteConnection,
        proposal: &NewBurnProposal,
    ) -> SettlementResult<BurnProposal> {
        diesel::insert_into(burn_proposals::table)
            .values(proposal)
            .execute(conn)?;
        Self::find_by_id(conn, &proposal.id)
    }

    pub fn find_by_id(conn: &mut SqliteConnection, id: &str) -> SettlementResult<BurnProposal> {
        burn_proposals::table
            .filter(burn_proposals::id.eq(id))
            .first(conn)
            .optional()?
            .ok_or_else(|| SettlementError::not_found("burn_proposal", id))
    }

    /// Newest first, optionally filtered by status
    pub fn list(
        conn: &mut SqliteConnection,
        status: Option<BurnStatus>,
        limit: i64,
    ) -> SettlementResult<Vec<BurnProposal>> {
        let mut query = burn_proposals::table.into_boxed();
        if let Some(status) = status {
            query = query.filter(burn_proposals::status.eq(status.as_str()));
        }
        Ok(query
            .order(burn_proposals::created_at.desc())
            .limit(limit)
            .load(conn)?)
    }

    /// Sum of proposals created since `since` that still count toward the
    /// rolling burn limit
    pub fn window_total(conn: &mut SqliteConnection, since: NaiveDateTime) -> SettlementResult<i64> {
        let counted: Vec<&str> = [
            BurnStatus::Pending,
            BurnStatus::Approved,
            BurnStatus::Rejected,
            BurnStatus::Executed,
        ]
        .into_iter()
        .filter(|s| s.counts_toward_window())
        .map(|s| s.as_str())
        .collect();

        let amounts: Vec<i64> = burn_proposals::table
            .filter(burn_proposals::created_at.ge(since))
            .filter(burn_proposals::status.eq_any(counted))
            .select(burn_proposals::calculated_amount)
            .load(conn)?;
        Ok(amounts.into_iter().fold(0i64, |acc, a| acc.saturating_add(a)))
    }

    /// Move a pending proposal to approved or rejected
    pub fn review(
        conn: &mut SqliteConnection,
        id: &str,
        outcome: BurnStatus,
        reviewed_by: &str,
        note: Option<&str>,
    ) -> SettlementResult<bool> {
        let now = Utc::now().naive_utc();
        let updated = diesel::update(
            burn_proposals::table
                .filter(burn_proposals::id.eq(id))
                .filter(burn_proposals::status.eq(BurnStatus::Pending.as_str())),
        )
        .set((
            burn_proposals::status.eq(outcome.as_str()),
            burn_proposals::reviewed_by.eq(Some(reviewed_by)),
            burn_proposals::review_note.eq(note),
            burn_proposals::reviewed_at.eq(Some(now)),
            burn_proposals::updated_at.eq(now),
        ))
        .execute(conn)?;
        Ok(updated == 1)
    }

    /// Record the out-of-band burn of an approved proposal
    pub fn record_execution(
        conn: &mut SqliteConnection,
        id: &str,
        executed_by: &str,
        signature: &str,
    ) -> SettlementResult<bool> {
        let now = Utc::now().naive_utc();
        let updated = diesel::update(
            burn_proposals::table
                .filter(burn_proposals::id.eq(id))
                .filter(burn_proposals::status.eq(BurnStatus::Approved.as_str())),
        )
        .set((
            burn_proposals::status.eq(BurnStatus::Executed.as_str()),
            burn_proposals::executed_by.eq(Some(executed_by)),
            burn_proposals::execution_signature.eq(Some(signature)),
            burn_proposals::executed_at.eq(Some(now)),
            burn_proposals::updated_at.eq(now),
        ))
        .execute(conn)?;
        Ok(updated == 1)
    }

    pub fn burn_status(&self) -> SettlementResult<BurnStatus> {
        Ok(self.status.parse()?)
    }
}
