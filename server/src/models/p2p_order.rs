//! P2P order records
//!
//! Status changes go through [`P2pOrder::transition_from`], a conditional
//! update on the current status, so that racing writers (a completion
//! request and the expiry sweep) cannot both win.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tkoin_types::{OrderStatus, TkoinAmount};

use crate::error::{SettlementError, SettlementResult};
use crate::schema::p2p_orders;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = p2p_orders)]
pub struct P2pOrder {
    pub id: String,
    pub agent_id: String,
    pub user_id: String,
    pub platform_id: Option<String>,
    pub tkoin_amount: i64,
    pub fiat_amount_minor: i64,
    pub fiat_currency: String,
    pub payment_method: Option<String>,
    pub status: String,
    pub expires_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub cancel_reason: Option<String>,
    pub webhook_delivered: i32,
    pub webhook_attempts: i32,
    pub webhook_last_response: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = p2p_orders)]
pub struct NewP2pOrder {
    pub id: String,
    pub agent_id: String,
    pub user_id: String,
    pub platform_id: Option<String>,
    pub tkoin_amount: i64,
    pub fiat_amount_minor: i64,
    pub fiat_currency: String,
    pub payment_method: Option<String>,
    pub status: String,
    pub expires_at: NaiveDateTime,
    pub webhook_delivered: i32,
    pub webhook_attempts: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl P2pOrder {
    pub fn insert(conn: &mut SqliteConnection, order: &NewP2pOrder) -> SettlementResult<P2pOrder> {
        diesel::insert_into(p2p_orders::table)
            .values(order)
            .execute(conn)?;
        Self::find_by_id(conn, &order.id)
    }

    pub fn find_by_id(conn: &mut SqliteConnection, id: &str) -> SettlementResult<P2pOrder> {
        p2p_orders::table
            .filter(p2p_orders::id.eq(id))
            .first(conn)
            .optional()?
            .ok_or_else(|| SettlementError::not_found("order", id))
    }

    pub fn find_by_agent(
        conn: &mut SqliteConnection,
        agent_id: &str,
        limit: i64,
    ) -> SettlementResult<Vec<P2pOrder>> {
        Ok(p2p_orders::table
            .filter(p2p_orders::agent_id.eq(agent_id))
            .order(p2p_orders::created_at.desc())
            .limit(limit)
            .load(conn)?)
    }

    /// Non-terminal orders whose deadline has passed
    pub fn find_expired(
        conn: &mut SqliteConnection,
        now: NaiveDateTime,
        limit: i64,
    ) -> SettlementResult<Vec<P2pOrder>> {
        let open: Vec<&str> = OrderStatus::NON_TERMINAL.iter().map(|s| s.as_str()).collect();
        Ok(p2p_orders::table
            .filter(p2p_orders::status.eq_any(open))
            .filter(p2p_orders::expires_at.le(now))
            .order(p2p_orders::expires_at.asc())
            .limit(limit)
            .load(conn)?)
    }

    /// Move the order to `next` if it is still in one of the states allowed
    /// to reach `next`
    ///
    /// Returns false when the order had already left those states; the
    /// caller treats that as a lost race, not an error.
    pub fn transition_from(
        conn: &mut SqliteConnection,
        id: &str,
        next: OrderStatus,
        cancel_reason: Option<&str>,
    ) -> SettlementResult<bool> {
        let sources: Vec<&str> = OrderStatus::sources_of(next)
            .into_iter()
            .map(|s| s.as_str())
            .collect();
        let now = Utc::now().naive_utc();
        let target = p2p_orders::table
            .filter(p2p_orders::id.eq(id))
            .filter(p2p_orders::status.eq_any(sources));

        let updated = match next {
            OrderStatus::Completed => diesel::update(target)
                .set((
                    p2p_orders::status.eq(next.as_str()),
                    p2p_orders::completed_at.eq(Some(now)),
                    p2p_orders::updated_at.eq(now),
                ))
                .execute(conn)?,
            OrderStatus::Cancelled | OrderStatus::Expired => diesel::update(target)
                .set((
                    p2p_orders::status.eq(next.as_str()),
                    p2p_orders::cancelled_at.eq(Some(now)),
                    p2p_orders::cancel_reason.eq(cancel_reason),
                    p2p_orders::updated_at.eq(now),
                ))
                .execute(conn)?,
            _ => diesel::update(target)
                .set((
                    p2p_orders::status.eq(next.as_str()),
                    p2p_orders::updated_at.eq(now),
                ))
                .execute(conn)?,
        };
        Ok(updated == 1)
    }

    /// Record the outcome of an outbound notification
    pub fn record_webhook_outcome(
        conn: &mut SqliteConnection,
        id: &str,
        delivered: bool,
        attempts: i32,
        last_response: Option<&str>,
    ) -> SettlementResult<()> {
        diesel::update(p2p_orders::table.filter(p2p_orders::id.eq(id)))
            .set((
                p2p_orders::webhook_delivered.eq(i32::from(delivered)),
                p2p_orders::webhook_attempts.eq(p2p_orders::webhook_attempts + attempts),
                p2p_orders::webhook_last_response.eq(last_response),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn order_status(&self) -> SettlementResult<OrderStatus> {
        Ok(self.status.parse()?)
    }

    pub fn amount(&self) -> TkoinAmount {
        TkoinAmount(self.tkoin_amount)
    }

    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at <= now
    }
}
