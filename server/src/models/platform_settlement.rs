//! Deposit and withdrawal settlements reported by partner platforms

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tkoin_types::ParseEnumError;

use crate::error::{SettlementError, SettlementResult};
use crate::schema::platform_settlements;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    Deposit,
    Withdrawal,
}

impl SettlementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementKind::Deposit => "deposit",
            SettlementKind::Withdrawal => "withdrawal",
        }
    }
}

impl FromStr for SettlementKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(SettlementKind::Deposit),
            "withdrawal" => Ok(SettlementKind::Withdrawal),
            other => Err(ParseEnumError::new("settlement kind", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Received,
    Completed,
    Failed,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Received => "received",
            SettlementStatus::Completed => "completed",
            SettlementStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = platform_settlements)]
pub struct PlatformSettlement {
    pub id: String,
    pub platform_id: String,
    pub kind: String,
    pub external_reference: String,
    pub user_id: String,
    pub tkoin_amount: i64,
    pub status: String,
    pub webhook_delivered: i32,
    pub webhook_attempts: i32,
    pub webhook_last_response: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = platform_settlements)]
pub struct NewPlatformSettlement {
    pub id: String,
    pub platform_id: String,
    pub kind: String,
    pub external_reference: String,
    pub user_id: String,
    pub tkoin_amount: i64,
    pub status: String,
    pub webhook_delivered: i32,
    pub webhook_attempts: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl PlatformSettlement {
    /// Insert, or return the existing row for the same platform reference
    ///
    /// The boolean is true when a new row was created.
    pub fn insert_or_existing(
        conn: &mut SqliteConnection,
        row: &NewPlatformSettlement,
    ) -> SettlementResult<(PlatformSettlement, bool)> {
        match diesel::insert_into(platform_settlements::table)
            .values(row)
            .execute(conn)
        {
            Ok(_) => Ok((Self::find_by_id(conn, &row.id)?, true)),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                let existing = platform_settlements::table
                    .filter(platform_settlements::platform_id.eq(&row.platform_id))
                    .filter(platform_settlements::external_reference.eq(&row.external_reference))
                    .first(conn)?;
                Ok((existing, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_by_id(conn: &mut SqliteConnection, id: &str) -> SettlementResult<PlatformSettlement> {
        platform_settlements::table
            .filter(platform_settlements::id.eq(id))
            .first(conn)
            .optional()?
            .ok_or_else(|| SettlementError::not_found("settlement", id))
    }

    /// Move a received settlement to completed or failed
    pub fn finish(
        conn: &mut SqliteConnection,
        id: &str,
        outcome: SettlementStatus,
    ) -> SettlementResult<bool> {
        let updated = diesel::update(
            platform_settlements::table
                .filter(platform_settlements::id.eq(id))
                .filter(platform_settlements::status.eq(SettlementStatus::Received.as_str())),
        )
        .set((
            platform_settlements::status.eq(outcome.as_str()),
            platform_settlements::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
        Ok(updated == 1)
    }

    pub fn record_webhook_outcome(
        conn: &mut SqliteConnection,
        id: &str,
        delivered: bool,
        attempts: i32,
        last_response: Option<&str>,
    ) -> SettlementResult<()> {
        diesel::update(platform_settlements::table.filter(platform_settlements::id.eq(id)))
            .set((
                platform_settlements::webhook_delivered.eq(i32::from(delivered)),
                platform_settlements::webhook_attempts
                    .eq(platform_settlements::webhook_attempts + attempts),
                platform_settlements::webhook_last_response.eq(last_response),
                platform_settlements::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// Finished settlements whose notification never went through
    pub fn find_undelivered(
        conn: &mut SqliteConnection,
        platform_id: &str,
    ) -> SettlementResult<Vec<PlatformSettlement>> {
        Ok(platform_settlements::table
            .filter(platform_settlements::platform_id.eq(platform_id))
            .filter(platform_settlements::status.ne(SettlementStatus::Received.as_str()))
            .filter(platform_settlements::webhook_delivered.eq(0))
            .order(platform_settlements::created_at.asc())
            .load(conn)?)
    }
}
