//! Governance Tests
//!
//! - Slashing: pending -> executed -> reversed, each step at most once
//! - Burn: safety limits gate creation; review and execution transitions

use server::error::SettlementError;
use server::models::audit_event::Actor;
use server::services::slashing::SlashRequest;
use tkoin_types::{BurnStatus, Tier, TransitionError};

use crate::mock_infrastructure::{tokens, TestContext};

const WALLET: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";
const TREASURY: &str = "TreasuryWa11et1111111111111111111111111111";

fn slash_request(agent_id: &str, severity: &str) -> SlashRequest {
    SlashRequest {
        agent_id: agent_id.to_string(),
        violation_type: "payment_fraud".to_string(),
        severity: severity.to_string(),
        description: "Marked fiat as received without payment".to_string(),
        evidence_url: Some("https://evidence.example.com/case/17".to_string()),
    }
}

async fn staked_agent(ctx: &TestContext, amount: i64) -> String {
    let agent = ctx.register_agent(WALLET, 0).await;
    ctx.chain.set_balance(WALLET, tokens(amount));
    ctx.core
        .staking
        .stake(&agent.id, WALLET, amount as f64)
        .await
        .unwrap();
    agent.id
}

#[tokio::test]
async fn test_slash_execute_and_reverse_restores_stake() {
    let ctx = TestContext::new();
    let agent_id = staked_agent(&ctx, 12_000).await;
    let admin = Actor::admin("admin-1");

    let event = ctx
        .core
        .slashing
        .create(slash_request(&agent_id, "critical"), &admin)
        .await
        .unwrap();
    assert_eq!(event.status, "pending");
    // Creating has no balance effect
    let info = ctx.core.staking.get_stake_info(&agent_id).await.unwrap();
    assert_eq!(info.staked_amount, tokens(12_000));

    let executed = ctx.core.slashing.execute(&event.id, &admin).await.unwrap();
    assert_eq!(executed.status, "executed");
    assert_eq!(executed.slashed_amount, Some(tokens(6_000).base_units()));
    assert_eq!(executed.previous_tier.as_deref(), Some("verified"));
    assert_eq!(executed.new_tier.as_deref(), Some("basic"));

    let info = ctx.core.staking.get_stake_info(&agent_id).await.unwrap();
    assert_eq!(info.staked_amount, tokens(6_000));
    assert_eq!(ctx.agent(&agent_id).await.verification_tier, "basic");

    let reversed = ctx
        .core
        .slashing
        .reverse(&event.id, "evidence was forged", &admin)
        .await
        .unwrap();
    assert_eq!(reversed.status, "reversed");
    assert_eq!(reversed.reversal_reason.as_deref(), Some("evidence was forged"));

    let info = ctx.core.staking.get_stake_info(&agent_id).await.unwrap();
    assert_eq!(info.staked_amount, tokens(12_000));
    assert_eq!(info.current_tier, Tier::Verified);
    assert_eq!(ctx.agent(&agent_id).await.verification_tier, "verified");
}

#[tokio::test]
async fn test_slash_cannot_execute_twice() {
    let ctx = TestContext::new();
    let agent_id = staked_agent(&ctx, 10_000).await;
    let admin = Actor::admin("admin-1");

    let event = ctx
        .core
        .slashing
        .create(slash_request(&agent_id, "minor"), &admin)
        .await
        .unwrap();
    ctx.core.slashing.execute(&event.id, &admin).await.unwrap();

    let err = ctx.core.slashing.execute(&event.id, &admin).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransition(_)));

    // Only the first execution took 10%
    let info = ctx.core.staking.get_stake_info(&agent_id).await.unwrap();
    assert_eq!(info.staked_amount, tokens(9_000));
}

#[tokio::test]
async fn test_reversing_pending_slash_is_rejected() {
    let ctx = TestContext::new();
    let agent_id = staked_agent(&ctx, 2_000).await;
    let admin = Actor::admin("admin-1");

    let event = ctx
        .core
        .slashing
        .create(slash_request(&agent_id, "major"), &admin)
        .await
        .unwrap();

    let err = ctx
        .core
        .slashing
        .reverse(&event.id, "changed my mind", &admin)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::InvalidTransition(TransitionError { .. })
    ));

    let err = ctx.core.slashing.reverse(&event.id, "   ", &admin).await.unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));

    let pending = ctx.core.slashing.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(ctx.core.slashing.list_for_agent(&agent_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_slash_request_validation() {
    let ctx = TestContext::new();
    let agent_id = staked_agent(&ctx, 2_000).await;
    let admin = Actor::admin("admin-1");

    let err = ctx
        .core
        .slashing
        .create(slash_request(&agent_id, "catastrophic"), &admin)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));

    let err = ctx
        .core
        .slashing
        .create(slash_request("missing-agent", "minor"), &admin)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::NotFound { .. }));
}

#[tokio::test]
async fn test_burn_calculation_is_pure() {
    let ctx = TestContext::new();
    let first = ctx.core.burn.calculate_proposed_burn(TREASURY).await.unwrap();
    let second = ctx.core.burn.calculate_proposed_burn(TREASURY).await.unwrap();

    // 1% of a 10M treasury
    assert_eq!(first.proposed_amount, tokens(100_000));
    assert_eq!(first.proposed_amount, second.proposed_amount);
    assert!(ctx.core.burn.list_proposals(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_burn_over_max_is_not_persisted() {
    let ctx = TestContext::new();
    // 1% of 200M is 2M, above the 1M per-proposal ceiling
    ctx.chain.set_treasury_balance(tokens(200_000_000));
    let admin = Actor::admin("admin-1");

    let err = ctx
        .core
        .burn
        .create_proposal("quarterly burn", TREASURY, &admin)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::SafetyLimitViolation(_)));
    assert!(ctx.core.burn.list_proposals(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_burn_approve_then_execute() {
    let ctx = TestContext::new();
    let admin = Actor::admin("admin-1");

    let proposal = ctx
        .core
        .burn
        .create_proposal("monthly burn", TREASURY, &admin)
        .await
        .unwrap();
    assert_eq!(proposal.status, "pending");
    assert_eq!(proposal.calculated_amount, tokens(100_000).base_units());

    // Executing before approval is not a valid transition
    let err = ctx
        .core
        .burn
        .mark_executed(&proposal.id, "5VERYLONGSIGNATURE", &admin)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransition(_)));

    let approved = ctx
        .core
        .burn
        .approve_proposal(&proposal.id, &Actor::admin("admin-2"), Some("looks right"))
        .await
        .unwrap();
    assert_eq!(approved.status, "approved");
    assert_eq!(approved.reviewed_by.as_deref(), Some("admin-2"));

    let executed = ctx
        .core
        .burn
        .mark_executed(&proposal.id, "5VERYLONGSIGNATURE", &admin)
        .await
        .unwrap();
    assert_eq!(executed.status, "executed");
    assert_eq!(executed.execution_signature.as_deref(), Some("5VERYLONGSIGNATURE"));

    let listed = ctx
        .core
        .burn
        .list_proposals(Some(BurnStatus::Executed), 10)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_rejected_burn_is_final() {
    let ctx = TestContext::new();
    let admin = Actor::admin("admin-1");

    let proposal = ctx
        .core
        .burn
        .create_proposal("monthly burn", TREASURY, &admin)
        .await
        .unwrap();
    let rejected = ctx
        .core
        .burn
        .reject_proposal(&proposal.id, &admin, Some("treasury needed for payouts"))
        .await
        .unwrap();
    assert_eq!(rejected.status, "rejected");

    let err = ctx
        .core
        .burn
        .approve_proposal(&proposal.id, &admin, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_burn_window_limit_counts_open_proposals() {
    let ctx = TestContext::new();
    let admin = Actor::admin("admin-1");
    // 1% of 100M is 1M per proposal; the window allows 3% of 1B = 30M
    ctx.chain.set_treasury_balance(tokens(100_000_000));

    for _ in 0..30 {
        ctx.core
            .burn
            .create_proposal("scheduled burn", TREASURY, &admin)
            .await
            .unwrap();
    }
    let err = ctx
        .core
        .burn
        .create_proposal("one too many", TREASURY, &admin)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::SafetyLimitViolation(_)));
}
