//! Periodic purge of expired webhook nonces

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::db::{with_conn, DbPool};
use crate::error::SettlementResult;
use crate::models::webhook_nonce::WebhookNonce;

pub struct NonceCleanupWorker {
    pool: DbPool,
    interval: Duration,
}

impl NonceCleanupWorker {
    pub fn new(pool: DbPool, interval: Duration) -> Self {
        Self { pool, interval }
    }

    /// Delete expired nonces once; returns the number removed
    pub async fn run_once(&self) -> SettlementResult<usize> {
        let now = Utc::now().naive_utc();
        with_conn(&self.pool, move |conn| WebhookNonce::purge_expired(conn, now)).await
    }

    /// Run forever; failures are logged and retried next tick
    pub async fn start(self: Arc<Self>) {
        info!(interval_secs = self.interval.as_secs(), "Starting webhook nonce cleanup worker");
        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(0) => debug!("No expired webhook nonces"),
                Ok(purged) => info!(purged, "Purged expired webhook nonces"),
                Err(e) => error!(error = %e, "Webhook nonce cleanup failed"),
            }
        }
    }
}
