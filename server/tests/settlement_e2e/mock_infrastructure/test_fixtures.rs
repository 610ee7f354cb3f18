//! Temp-database fixtures wired the way `main` wires the server

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use server::config::SettlementConfig;
use server::db::{create_pool, run_migrations, with_conn, DbPool};
use server::models::agent::Agent;
use server::models::audit_event::Actor;
use server::models::sovereign_platform::SovereignPlatform;
use server::schema::{agent_stakes, p2p_orders};
use server::services::p2p_orders::CreateOrderRequest;
use server::services::SettlementCore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tkoin_types::{Tier, TkoinAmount};

use super::{tokens, MockChain};

pub const PLATFORM_SECRET: &str = "whsec_test_secret_0123456789abcdef";

/// Nothing listens here; outbound deliveries fail fast
pub const DEAD_WEBHOOK_URL: &str = "http://127.0.0.1:9/webhooks/tkoin";

pub struct TestContext {
    _dir: TempDir,
    pub pool: DbPool,
    pub config: SettlementConfig,
    pub chain: Arc<MockChain>,
    pub core: SettlementCore,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Self::test_config())
    }

    pub fn test_config() -> SettlementConfig {
        let mut config = SettlementConfig::default();
        config.webhook.max_attempts = 1;
        config.webhook.retry_backoff = Duration::from_millis(10);
        config.webhook.verification_timeout = Duration::from_secs(2);
        config.webhook.settlement_timeout = Duration::from_secs(2);
        config
    }

    pub fn with_config(config: SettlementConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("settlement.db");
        let pool = create_pool(db_path.to_str().unwrap(), "").unwrap();
        run_migrations(&pool).unwrap();

        let chain = Arc::new(MockChain::new());
        let core = SettlementCore::new(pool.clone(), &config, chain.clone(), chain.clone()).unwrap();

        Self {
            _dir: dir,
            pool,
            config,
            chain,
            core,
        }
    }

    pub fn conn(&self) -> PooledConnection<ConnectionManager<SqliteConnection>> {
        self.pool.get().unwrap()
    }

    pub async fn register_agent(&self, wallet: &str, balance_tokens: i64) -> Agent {
        let wallet = wallet.to_string();
        let limits = self.config.staking.limits.limits_for(Tier::Basic);
        with_conn(&self.pool, move |conn| {
            Agent::register(conn, &wallet, tokens(balance_tokens), limits)
        })
        .await
        .unwrap()
    }

    pub async fn agent(&self, agent_id: &str) -> Agent {
        self.core.ledger.get_agent(agent_id).await.unwrap()
    }

    pub async fn register_platform(&self, platform_id: &str) -> SovereignPlatform {
        self.core
            .settlements
            .register_platform(
                platform_id,
                "Test Casino",
                DEAD_WEBHOOK_URL,
                PLATFORM_SECRET,
                &Actor::admin("admin-1"),
            )
            .await
            .unwrap()
    }

    pub fn order_request(&self, agent_id: &str, amount: TkoinAmount) -> CreateOrderRequest {
        CreateOrderRequest {
            agent_id: agent_id.to_string(),
            user_id: "user-42".to_string(),
            platform_id: None,
            tkoin_amount: amount,
            fiat_amount_minor: 10_000,
            fiat_currency: "USD".to_string(),
            payment_method: Some("bank_transfer".to_string()),
            ttl_secs: None,
        }
    }

    /// Move an order's deadline into the past
    pub fn backdate_order(&self, order_id: &str) {
        let past = Utc::now().naive_utc() - ChronoDuration::minutes(5);
        diesel::update(p2p_orders::table.filter(p2p_orders::id.eq(order_id)))
            .set(p2p_orders::expires_at.eq(past))
            .execute(&mut self.conn())
            .unwrap();
    }

    /// End the agent's lockup window
    pub fn end_lockup(&self, agent_id: &str) {
        let past: NaiveDateTime = Utc::now().naive_utc() - ChronoDuration::days(1);
        diesel::update(agent_stakes::table.filter(agent_stakes::agent_id.eq(agent_id)))
            .set(agent_stakes::locked_until.eq(Some(past)))
            .execute(&mut self.conn())
            .unwrap();
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
