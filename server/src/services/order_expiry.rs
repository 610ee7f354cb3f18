//! Periodic expiry sweep for P2P orders
//!
//! Each overdue order is expired in its own transaction through
//! [`OrderService::expire_order`], so overlapping sweeps and concurrent
//! completions settle every lock exactly once.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::db::with_conn;
use crate::error::{SettlementError, SettlementResult};
use crate::models::p2p_order::P2pOrder;
use crate::services::p2p_orders::OrderService;

/// Orders handled per sweep; the rest wait for the next tick
const SWEEP_BATCH: i64 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    /// Already settled by a concurrent writer
    pub skipped: usize,
    pub failed: usize,
}

pub struct OrderExpirySweeper {
    orders: Arc<OrderService>,
    interval: Duration,
}

impl OrderExpirySweeper {
    pub fn new(orders: Arc<OrderService>, interval: Duration) -> Self {
        Self { orders, interval }
    }

    pub async fn run_once(&self) -> SettlementResult<SweepReport> {
        let now = Utc::now().naive_utc();
        let overdue = with_conn(self.orders.pool(), move |conn| {
            P2pOrder::find_expired(conn, now, SWEEP_BATCH)
        })
        .await?;

        let mut report = SweepReport::default();
        for order in overdue {
            match self.orders.expire_order(&order.id).await {
                Ok(outcome) if outcome.applied => report.expired += 1,
                Ok(_) => report.skipped += 1,
                Err(e) if e.is_transient() || matches!(e, SettlementError::InvalidTransition(_)) => {
                    debug!(order_id = %order.id, error = %e, "Order settled concurrently, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "Failed to expire order");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Run forever; failures are logged and retried next tick
    pub async fn start(self: Arc<Self>) {
        info!(interval_secs = self.interval.as_secs(), "Starting order expiry sweeper");
        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(report) if report == SweepReport::default() => {}
                Ok(report) => info!(
                    expired = report.expired,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Order expiry sweep finished"
                ),
                Err(e) => error!(error = %e, "Order expiry sweep failed"),
            }
        }
    }
}
