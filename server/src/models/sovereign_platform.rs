//! Partner platform registry

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::error::{SettlementError, SettlementResult};
use crate::schema::sovereign_platforms;

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = sovereign_platforms)]
pub struct SovereignPlatform {
    pub id: String,
    pub name: String,
    pub webhook_url: String,
    #[serde(skip_serializing)]
    pub webhook_secret: String,
    pub is_active: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sovereign_platforms)]
pub struct NewSovereignPlatform {
    pub id: String,
    pub name: String,
    pub webhook_url: String,
    pub webhook_secret: String,
    pub is_active: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl SovereignPlatform {
    /// Register a platform; the URL must be http(s)
    pub fn register(
        conn: &mut SqliteConnection,
        id: &str,
        name: &str,
        webhook_url: &str,
        webhook_secret: &str,
    ) -> SettlementResult<SovereignPlatform> {
        let parsed = url::Url::parse(webhook_url)
            .map_err(|e| SettlementError::Validation(format!("invalid webhook url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SettlementError::Validation(
                "webhook url must be http or https".to_string(),
            ));
        }
        if webhook_secret.len() < 16 {
            return Err(SettlementError::Validation(
                "webhook secret must be at least 16 bytes".to_string(),
            ));
        }

        let now = Utc::now().naive_utc();
        let platform = NewSovereignPlatform {
            id: id.to_string(),
            name: name.to_string(),
            webhook_url: webhook_url.to_string(),
            webhook_secret: webhook_secret.to_string(),
            is_active: 1,
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(sovereign_platforms::table)
            .values(&platform)
            .execute(conn)?;
        Self::find_by_id(conn, id)
    }

    pub fn find_by_id(conn: &mut SqliteConnection, id: &str) -> SettlementResult<SovereignPlatform> {
        sovereign_platforms::table
            .filter(sovereign_platforms::id.eq(id))
            .first(conn)
            .optional()?
            .ok_or_else(|| SettlementError::not_found("platform", id))
    }

    pub fn set_active(conn: &mut SqliteConnection, id: &str, active: bool) -> SettlementResult<()> {
        let updated = diesel::update(sovereign_platforms::table.filter(sovereign_platforms::id.eq(id)))
            .set((
                sovereign_platforms::is_active.eq(i32::from(active)),
                sovereign_platforms::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        if updated == 0 {
            return Err(SettlementError::not_found("platform", id));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.is_active != 0
    }
}
