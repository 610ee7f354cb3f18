//! Audit Chain Tests
//!
//! - Every governance transition appends a linked record
//! - Editing a stored record breaks verification

use diesel::prelude::*;
use server::models::audit_event::{event_types, Actor, AuditEvent};
use server::schema::audit_events;
use server::services::slashing::SlashRequest;

use crate::mock_infrastructure::{tokens, TestContext};

const WALLET: &str = "AuditWa11et11111111111111111111111111111111";
const TREASURY: &str = "TreasuryWa11et1111111111111111111111111111";

async fn governance_history(ctx: &TestContext) -> String {
    let admin = Actor::admin("admin-1");
    let agent = ctx.register_agent(WALLET, 0).await;
    ctx.chain.set_balance(WALLET, tokens(5_000));
    ctx.core.staking.stake(&agent.id, WALLET, 5_000.0).await.unwrap();

    let slash = ctx
        .core
        .slashing
        .create(
            SlashRequest {
                agent_id: agent.id.clone(),
                violation_type: "late_release".to_string(),
                severity: "minor".to_string(),
                description: "Released tokens after the agreed window".to_string(),
                evidence_url: None,
            },
            &admin,
        )
        .await
        .unwrap();
    ctx.core.slashing.execute(&slash.id, &admin).await.unwrap();

    let proposal = ctx
        .core
        .burn
        .create_proposal("monthly burn", TREASURY, &admin)
        .await
        .unwrap();
    ctx.core
        .burn
        .approve_proposal(&proposal.id, &admin, None)
        .await
        .unwrap();
    slash.id
}

#[tokio::test]
async fn test_governance_actions_form_an_intact_chain() {
    let ctx = TestContext::new();
    let slash_id = governance_history(&ctx).await;

    let mut conn = ctx.conn();
    assert!(AuditEvent::verify_chain_integrity(&mut conn).unwrap().is_empty());

    let slash_events = AuditEvent::find_by_entity(&mut conn, "slashing_event", &slash_id).unwrap();
    let kinds: Vec<&str> = slash_events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(kinds, vec![event_types::SLASH_CREATED, event_types::SLASH_EXECUTED]);

    let executed = &slash_events[1];
    assert_eq!(executed.actor_id, "admin-1");
    assert_eq!(executed.actor_type, "admin");
    assert_eq!(
        executed.metadata_json()["slashed_amount"],
        tokens(500).base_units()
    );
    // Nothing else was written between creation and execution
    assert_eq!(
        executed.prev_hash.as_deref(),
        Some(slash_events[0].record_hash.as_str())
    );
}

#[tokio::test]
async fn test_tampering_is_detected() {
    let ctx = TestContext::new();
    let slash_id = governance_history(&ctx).await;

    let mut conn = ctx.conn();
    let events = AuditEvent::find_by_entity(&mut conn, "slashing_event", &slash_id).unwrap();
    let target = events[1].id.clone();

    diesel::update(audit_events::table.filter(audit_events::id.eq(&target)))
        .set(audit_events::metadata.eq(r#"{"slashed_amount":0}"#))
        .execute(&mut conn)
        .unwrap();

    let broken = AuditEvent::verify_chain_integrity(&mut conn).unwrap();
    assert_eq!(broken, vec![target]);
}
