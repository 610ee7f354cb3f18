//! Audit event model
//!
//! Append-only, tamper-evident audit log:
//! - Hash chaining: every record stores the previous record's hash
//! - Written inside the same transaction as the change it describes
//! - Metadata carries amounts and tiers, never webhook secrets

use chrono::{SecondsFormat, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SettlementResult;
use crate::schema::audit_events;

/// Actor type - who performed the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Admin,
    Agent,
    Platform,
    /// Background sweeps
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Admin => "admin",
            ActorType::Agent => "agent",
            ActorType::Platform => "platform",
            ActorType::System => "system",
        }
    }
}

/// Authenticated identity passed in by the request layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub kind: ActorType,
}

impl Actor {
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ActorType::Admin,
        }
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ActorType::Agent,
        }
    }

    pub fn platform(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ActorType::Platform,
        }
    }

    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            kind: ActorType::System,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize)]
#[diesel(table_name = audit_events)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: String,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_id: String,
    pub actor_type: String,
    pub metadata: String,
    pub prev_hash: Option<String>,
    pub record_hash: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_events)]
struct NewAuditEvent<'a> {
    id: &'a str,
    timestamp: &'a str,
    event_type: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    actor_id: &'a str,
    actor_type: &'a str,
    metadata: &'a str,
    prev_hash: Option<&'a str>,
    record_hash: &'a str,
}

#[allow(clippy::too_many_arguments)]
fn compute_hash(
    id: &str,
    timestamp: &str,
    event_type: &str,
    entity_type: &str,
    entity_id: &str,
    actor_id: &str,
    actor_type: &str,
    metadata: &str,
    prev_hash: Option<&str>,
) -> String {
    let input = format!(
        "{}|{}|{}|{}|{}|{}|{}|{}|{}",
        id,
        timestamp,
        event_type,
        entity_type,
        entity_id,
        actor_id,
        actor_type,
        metadata,
        prev_hash.unwrap_or("")
    );
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Builder for audit events
#[derive(Debug, Clone)]
pub struct AuditEventBuilder {
    event_type: String,
    entity_type: String,
    entity_id: String,
    actor: Actor,
    metadata: serde_json::Value,
}

impl AuditEventBuilder {
    /// `event_type` uses dot notation, see [`event_types`]
    pub fn new(event_type: &str, actor: &Actor) -> Self {
        Self {
            event_type: event_type.to_string(),
            entity_type: String::new(),
            entity_id: String::new(),
            actor: actor.clone(),
            metadata: serde_json::json!({}),
        }
    }

    pub fn entity(mut self, entity_type: &str, entity_id: &str) -> Self {
        self.entity_type = entity_type.to_string();
        self.entity_id = entity_id.to_string();
        self
    }

    pub fn metadata(mut self, key: &str, value: impl Serialize) -> Self {
        if let serde_json::Value::Object(ref mut map) = self.metadata {
            if let Ok(v) = serde_json::to_value(value) {
                map.insert(key.to_string(), v);
            }
        }
        self
    }

    /// Append the event to the chain
    ///
    /// Call inside the write transaction of the change being audited so the
    /// chain head read here cannot move before the insert.
    pub fn append(self, conn: &mut SqliteConnection) -> SettlementResult<AuditEvent> {
        let prev_hash = AuditEvent::last_hash(conn)?;
        let id = ulid::Ulid::new().to_string();
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        let metadata = self.metadata.to_string();
        let record_hash = compute_hash(
            &id,
            &timestamp,
            &self.event_type,
            &self.entity_type,
            &self.entity_id,
            &self.actor.id,
            self.actor.kind.as_str(),
            &metadata,
            prev_hash.as_deref(),
        );

        diesel::insert_into(audit_events::table)
            .values(&NewAuditEvent {
                id: &id,
                timestamp: &timestamp,
                event_type: &self.event_type,
                entity_type: &self.entity_type,
                entity_id: &self.entity_id,
                actor_id: &self.actor.id,
                actor_type: self.actor.kind.as_str(),
                metadata: &metadata,
                prev_hash: prev_hash.as_deref(),
                record_hash: &record_hash,
            })
            .execute(conn)?;

        Ok(AuditEvent {
            id,
            timestamp,
            event_type: self.event_type,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            actor_id: self.actor.id,
            actor_type: self.actor.kind.as_str().to_string(),
            metadata,
            prev_hash,
            record_hash,
        })
    }
}

impl AuditEvent {
    /// Hash of the chain head
    pub fn last_hash(conn: &mut SqliteConnection) -> SettlementResult<Option<String>> {
        Ok(audit_events::table
            .select(audit_events::record_hash)
            .order((audit_events::timestamp.desc(), audit_events::id.desc()))
            .first::<String>(conn)
            .optional()?)
    }

    /// All events for one entity, oldest first
    pub fn find_by_entity(
        conn: &mut SqliteConnection,
        entity_type: &str,
        entity_id: &str,
    ) -> SettlementResult<Vec<AuditEvent>> {
        Ok(audit_events::table
            .filter(audit_events::entity_type.eq(entity_type))
            .filter(audit_events::entity_id.eq(entity_id))
            .order((audit_events::timestamp.asc(), audit_events::id.asc()))
            .load(conn)?)
    }

    /// Verify chain integrity
    ///
    /// Returns the ids of events whose link or content hash does not match.
    pub fn verify_chain_integrity(conn: &mut SqliteConnection) -> SettlementResult<Vec<String>> {
        let events: Vec<AuditEvent> = audit_events::table
            .order((audit_events::timestamp.asc(), audit_events::id.asc()))
            .load(conn)?;

        let mut broken = Vec::new();
        let mut expected_prev: Option<String> = None;
        for event in events {
            let recomputed = compute_hash(
                &event.id,
                &event.timestamp,
                &event.event_type,
                &event.entity_type,
                &event.entity_id,
                &event.actor_id,
                &event.actor_type,
                &event.metadata,
                event.prev_hash.as_deref(),
            );
            if event.prev_hash != expected_prev || recomputed != event.record_hash {
                broken.push(event.id.clone());
            }
            expected_prev = Some(event.record_hash);
        }
        Ok(broken)
    }

    pub fn metadata_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.metadata).unwrap_or(serde_json::Value::Null)
    }
}

/// Standard event type constants
pub mod event_types {
    pub const STAKE_CREATED: &str = "stake.created";
    pub const STAKE_WITHDRAWN: &str = "stake.withdrawn";

    pub const SLASH_CREATED: &str = "slashing.created";
    pub const SLASH_EXECUTED: &str = "slashing.executed";
    pub const SLASH_REVERSED: &str = "slashing.reversed";

    pub const BURN_PROPOSED: &str = "burn.proposed";
    pub const BURN_APPROVED: &str = "burn.approved";
    pub const BURN_REJECTED: &str = "burn.rejected";
    pub const BURN_EXECUTED: &str = "burn.executed";

    pub const ORDER_CANCELLED: &str = "order.cancelled";
    pub const ORDER_EXPIRED: &str = "order.expired";

    pub const PLATFORM_REGISTERED: &str = "platform.registered";
    pub const PLATFORM_STATUS_CHANGED: &str = "platform.status_changed";
}
