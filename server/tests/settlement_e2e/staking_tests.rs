//! Staking Tests
//!
//! - Tier thresholds drive tier and limits in both directions
//! - Lockup window and the forced-unstake penalty
//! - Stake validation against the on-chain balance

use server::error::SettlementError;
use server::models::audit_event::{event_types, AuditEvent};
use tkoin_types::{StakeOperation, Tier};

use crate::mock_infrastructure::{tokens, TestContext};

const WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

#[tokio::test]
async fn test_stake_crossing_threshold_upgrades_tier_and_limits() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent(WALLET, 0).await;
    ctx.chain.set_balance(WALLET, tokens(20_000));

    let first = ctx.core.staking.stake(&agent.id, WALLET, 9_000.0).await.unwrap();
    assert_eq!(first.new_tier, Tier::Basic);
    assert!(!first.tier_changed());

    let second = ctx.core.staking.stake(&agent.id, WALLET, 2_000.0).await.unwrap();
    assert_eq!(second.staked_amount, tokens(11_000));
    assert_eq!(second.previous_tier, Tier::Basic);
    assert_eq!(second.new_tier, Tier::Verified);

    let verified = ctx.config.staking.limits.limits_for(Tier::Verified);
    let after = ctx.agent(&agent.id).await;
    assert_eq!(after.verification_tier, "verified");
    assert_eq!(after.daily_limit, verified.daily_limit);
    assert_eq!(after.monthly_limit, verified.monthly_limit);
    // Staking is bookkeeping; the ledger balance is untouched
    assert_eq!(after.locked_balance, 0);
}

#[tokio::test]
async fn test_unstake_below_threshold_downgrades_tier() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent(WALLET, 0).await;
    ctx.chain.set_balance(WALLET, tokens(20_000));
    ctx.core.staking.stake(&agent.id, WALLET, 11_000.0).await.unwrap();
    ctx.end_lockup(&agent.id);

    let outcome = ctx.core.staking.unstake(&agent.id, 2_000.0, false).await.unwrap();
    assert_eq!(outcome.staked_amount, tokens(9_000));
    assert_eq!(outcome.penalty, tokens(0));
    assert_eq!(outcome.final_amount, tokens(2_000));
    assert_eq!(outcome.previous_tier, Tier::Verified);
    assert_eq!(outcome.new_tier, Tier::Basic);

    let basic = ctx.config.staking.limits.limits_for(Tier::Basic);
    let after = ctx.agent(&agent.id).await;
    assert_eq!(after.verification_tier, "basic");
    assert_eq!(after.daily_limit, basic.daily_limit);
}

#[tokio::test]
async fn test_unstake_inside_lockup_requires_force() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent(WALLET, 0).await;
    ctx.chain.set_balance(WALLET, tokens(5_000));
    ctx.core.staking.stake(&agent.id, WALLET, 5_000.0).await.unwrap();

    let err = ctx.core.staking.unstake(&agent.id, 1_000.0, false).await.unwrap_err();
    match err {
        SettlementError::StakeLocked { days_remaining, .. } => {
            assert_eq!(days_remaining, ctx.config.staking.lockup_days)
        }
        other => panic!("expected StakeLocked, got {other:?}"),
    }

    let info = ctx.core.staking.get_stake_info(&agent.id).await.unwrap();
    assert_eq!(info.staked_amount, tokens(5_000));
    assert!(info.is_locked);
}

#[tokio::test]
async fn test_forced_unstake_withholds_penalty() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent(WALLET, 0).await;
    ctx.chain.set_balance(WALLET, tokens(5_000));
    ctx.core.staking.stake(&agent.id, WALLET, 5_000.0).await.unwrap();

    let outcome = ctx.core.staking.unstake(&agent.id, 1_000.0, true).await.unwrap();
    assert_eq!(outcome.penalty, tokens(100));
    assert_eq!(outcome.final_amount, tokens(900));
    assert_eq!(outcome.staked_amount, tokens(4_000));

    let history = ctx.core.staking.history(&agent.id, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].operation_type, StakeOperation::Unstake.as_str());
    assert_eq!(history[0].penalty_amount, tokens(100).base_units());
    assert_eq!(history[1].operation_type, StakeOperation::Stake.as_str());
}

#[tokio::test]
async fn test_unstake_more_than_staked_is_rejected() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent(WALLET, 0).await;
    ctx.chain.set_balance(WALLET, tokens(2_000));
    ctx.core.staking.stake(&agent.id, WALLET, 2_000.0).await.unwrap();

    let err = ctx.core.staking.unstake(&agent.id, 3_000.0, true).await.unwrap_err();
    assert!(matches!(err, SettlementError::InsufficientStakedBalance { .. }));
}

#[tokio::test]
async fn test_stake_rejections() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent(WALLET, 0).await;
    ctx.chain.set_balance(WALLET, tokens(1_500));

    // Below the minimum stake
    let err = ctx.core.staking.stake(&agent.id, WALLET, 10.0).await.unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));

    // Wallet of someone else
    let err = ctx
        .core
        .staking
        .stake(&agent.id, "SomeOtherWallet1111111111111111", 1_000.0)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));

    // More than the wallet holds on chain
    let err = ctx.core.staking.stake(&agent.id, WALLET, 2_000.0).await.unwrap_err();
    assert!(matches!(err, SettlementError::InsufficientBalance { .. }));

    let info = ctx.core.staking.get_stake_info(&agent.id).await.unwrap();
    assert_eq!(info.staked_amount, tokens(0));
    assert_eq!(info.next_tier, Some(Tier::Verified));
    assert_eq!(info.tokens_needed, Some(tokens(10_000)));
}

#[tokio::test]
async fn test_stake_writes_audit_event() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent(WALLET, 0).await;
    ctx.chain.set_balance(WALLET, tokens(3_000));
    ctx.core.staking.stake(&agent.id, WALLET, 3_000.0).await.unwrap();

    let stake_id = ctx.core.staking.history(&agent.id, 1).await.unwrap()[0].stake_id.clone();
    let events = AuditEvent::find_by_entity(&mut ctx.conn(), "agent_stake", &stake_id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, event_types::STAKE_CREATED);
}

#[tokio::test]
async fn test_sync_on_chain_balance_leaves_stake_alone() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent(WALLET, 0).await;
    ctx.chain.set_balance(WALLET, tokens(4_000));
    ctx.core.staking.stake(&agent.id, WALLET, 2_000.0).await.unwrap();

    ctx.chain.set_balance(WALLET, tokens(1_234));
    let synced = ctx.core.staking.sync_on_chain_balance(&agent.id).await.unwrap();
    assert_eq!(synced, tokens(1_234));

    let info = ctx.core.staking.get_stake_info(&agent.id).await.unwrap();
    assert_eq!(info.staked_amount, tokens(2_000));
    assert_eq!(info.on_chain_balance, Some(tokens(1_234)));
}
