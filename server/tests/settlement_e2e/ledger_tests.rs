//! Ledger Tests
//!
//! - Lock/unlock/transfer arithmetic
//! - Over-commit rejection without side effects
//! - `0 <= locked <= balance` under concurrent writers

use server::error::SettlementError;
use std::sync::Arc;

use crate::mock_infrastructure::{tokens, TestContext};

#[tokio::test]
async fn test_lock_unlock_round_trip() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent("7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU", 1_000).await;

    ctx.core.ledger.lock(&agent.id, tokens(400)).await.unwrap();
    let locked = ctx.agent(&agent.id).await;
    assert_eq!(locked.locked_balance, tokens(400).base_units());
    assert_eq!(locked.available(), tokens(600));

    ctx.core.ledger.unlock(&agent.id, tokens(400)).await.unwrap();
    let after = ctx.agent(&agent.id).await;
    assert_eq!(after.tkoin_balance, agent.tkoin_balance);
    assert_eq!(after.locked_balance, 0);
}

#[tokio::test]
async fn test_transfer_spends_locked_balance() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent("wallet-transfer-0001", 1_000).await;

    ctx.core.ledger.lock(&agent.id, tokens(250)).await.unwrap();
    ctx.core.ledger.transfer(&agent.id, tokens(250)).await.unwrap();

    let after = ctx.agent(&agent.id).await;
    assert_eq!(after.tkoin_balance, tokens(750).base_units());
    assert_eq!(after.locked_balance, 0);
}

#[tokio::test]
async fn test_lock_beyond_available_is_rejected() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent("wallet-overlock-0001", 100).await;
    ctx.core.ledger.lock(&agent.id, tokens(80)).await.unwrap();

    let err = ctx.core.ledger.lock(&agent.id, tokens(30)).await.unwrap_err();
    match err {
        SettlementError::InsufficientBalance {
            available,
            requested,
            ..
        } => {
            assert_eq!(available, tokens(20).base_units());
            assert_eq!(requested, tokens(30).base_units());
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }

    let after = ctx.agent(&agent.id).await;
    assert_eq!(after.locked_balance, tokens(80).base_units());
}

#[tokio::test]
async fn test_unlock_more_than_locked_is_a_conflict() {
    let ctx = TestContext::new();
    let agent = ctx.register_agent("wallet-unlock-0001", 100).await;
    ctx.core.ledger.lock(&agent.id, tokens(10)).await.unwrap();

    let err = ctx.core.ledger.unlock(&agent.id, tokens(11)).await.unwrap_err();
    assert!(matches!(err, SettlementError::ConcurrentUnlockConflict { .. }));
    assert_eq!(ctx.agent(&agent.id).await.locked_balance, tokens(10).base_units());
}

#[tokio::test]
async fn test_unknown_agent_is_not_found() {
    let ctx = TestContext::new();
    let err = ctx.core.ledger.unlock("no-such-agent", tokens(1)).await.unwrap_err();
    assert!(matches!(err, SettlementError::NotFound { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_locks_never_overcommit() {
    let ctx = Arc::new(TestContext::new());
    let agent = ctx.register_agent("wallet-race-0001", 100).await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let ctx = ctx.clone();
        let agent_id = agent.id.clone();
        handles.push(tokio::spawn(async move {
            ctx.core.ledger.lock(&agent_id, tokens(60)).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => successes += 1,
            Err(SettlementError::InsufficientBalance { .. })
            | Err(SettlementError::ConcurrentConflict { .. }) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    assert_eq!(successes, 1);
    let after = ctx.agent(&agent.id).await;
    assert_eq!(after.locked_balance, tokens(60).base_units());
    assert!(after.locked_balance <= after.tkoin_balance);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_balance_invariant_under_mixed_operations() {
    let ctx = Arc::new(TestContext::new());
    let agent = ctx.register_agent("wallet-mixed-0001", 1_000).await;

    // 30 workers each try to lock 50 and then either spend or release it;
    // at most 20 locks fit in the balance
    let mut handles = Vec::new();
    for i in 0..30 {
        let ctx = ctx.clone();
        let agent_id = agent.id.clone();
        handles.push(tokio::spawn(async move {
            if ctx.core.ledger.lock(&agent_id, tokens(50)).await.is_err() {
                return (false, false);
            }
            let spend = i % 2 == 0;
            if spend {
                ctx.core.ledger.transfer(&agent_id, tokens(50)).await.unwrap();
            } else {
                ctx.core.ledger.unlock(&agent_id, tokens(50)).await.unwrap();
            }
            (true, spend)
        }));
    }

    let mut spent = 0;
    for handle in handles {
        let (locked, spend) = handle.await.unwrap();
        if locked && spend {
            spent += 1;
        }
    }

    let after = ctx.agent(&agent.id).await;
    assert_eq!(after.locked_balance, 0);
    assert_eq!(after.tkoin_balance, tokens(1_000 - 50 * spent).base_units());
    assert!(after.tkoin_balance >= 0);
}
