pub mod burn;
pub mod chain;
pub mod ledger;
pub mod nonce_cleanup;
pub mod order_expiry;
pub mod p2p_orders;
pub mod settlement;
pub mod slashing;
pub mod staking;
pub mod webhook_dispatcher;
pub mod webhook_signing;
pub mod webhook_verifier;

use std::sync::Arc;

use crate::config::SettlementConfig;
use crate::db::DbPool;
use crate::error::SettlementResult;

use burn::BurnService;
use chain::{OnChainBalanceReader, TreasuryOracle};
use ledger::LedgerService;
use p2p_orders::OrderService;
use settlement::SettlementService;
use slashing::SlashingService;
use staking::StakingService;
use webhook_dispatcher::WebhookDispatcher;
use webhook_verifier::WebhookVerifier;

/// Every settlement service wired to one pool and one configuration
///
/// The request layer holds this and calls into the services with an
/// already-authenticated actor.
#[derive(Clone)]
pub struct SettlementCore {
    pub ledger: Arc<LedgerService>,
    pub staking: Arc<StakingService>,
    pub slashing: Arc<SlashingService>,
    pub burn: Arc<BurnService>,
    pub orders: Arc<OrderService>,
    pub settlements: Arc<SettlementService>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub verifier: Arc<WebhookVerifier>,
}

impl SettlementCore {
    pub fn new(
        pool: DbPool,
        config: &SettlementConfig,
        balances: Arc<dyn OnChainBalanceReader>,
        treasury: Arc<dyn TreasuryOracle>,
    ) -> SettlementResult<Self> {
        let dispatcher = Arc::new(WebhookDispatcher::new(pool.clone(), config.webhook.clone())?);
        Ok(Self {
            ledger: Arc::new(LedgerService::new(pool.clone())),
            staking: Arc::new(StakingService::new(
                pool.clone(),
                config.staking.clone(),
                balances,
            )),
            slashing: Arc::new(SlashingService::new(pool.clone(), config.staking.clone())),
            burn: Arc::new(BurnService::new(pool.clone(), config.burn.clone(), treasury)),
            orders: Arc::new(
                OrderService::new(
                    pool.clone(),
                    config.sweep.default_order_ttl_secs,
                    config.sweep.max_order_ttl_secs,
                )
                .with_webhook_dispatcher(dispatcher.clone()),
            ),
            settlements: Arc::new(SettlementService::new(pool.clone(), dispatcher.clone())),
            verifier: Arc::new(WebhookVerifier::new(pool, config.webhook.clone())),
            dispatcher,
        })
    }
}
