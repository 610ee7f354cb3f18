//! Consumed inbound webhook nonces
//!
//! The primary key on `nonce` is the replay guard: a second insert of the
//! same value fails with a unique violation.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::error::{SettlementError, SettlementResult};
use crate::schema::webhook_nonces;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = webhook_nonces)]
pub struct WebhookNonce {
    pub nonce: String,
    pub platform_id: String,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_nonces)]
pub struct NewWebhookNonce<'a> {
    pub nonce: &'a str,
    pub platform_id: &'a str,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl WebhookNonce {
    /// Consume a nonce; a repeat yields `ReplayDetected`
    pub fn consume(
        conn: &mut SqliteConnection,
        nonce: &str,
        platform_id: &str,
        expires_at: NaiveDateTime,
    ) -> SettlementResult<()> {
        let row = NewWebhookNonce {
            nonce,
            platform_id,
            expires_at,
            created_at: Utc::now().naive_utc(),
        };
        match diesel::insert_into(webhook_nonces::table)
            .values(&row)
            .execute(conn)
        {
            Ok(_) => Ok(()),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(SettlementError::ReplayDetected(nonce.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete nonces past their retention; returns the number removed
    pub fn purge_expired(conn: &mut SqliteConnection, now: NaiveDateTime) -> SettlementResult<usize> {
        Ok(
            diesel::delete(webhook_nonces::table.filter(webhook_nonces::expires_at.lt(now)))
                .execute(conn)?,
        )
    }

    pub fn count(conn: &mut SqliteConnection) -> SettlementResult<i64> {
        Ok(webhook_nonces::table.count().get_result(conn)?)
    }
}
