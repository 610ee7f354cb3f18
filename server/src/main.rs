use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use server::config::{ServerConfig, SettlementConfig};
use server::db::{create_pool, run_migrations};
use server::handlers::{health, platform_webhooks};
use server::services::chain::SolanaRpcReader;
use server::services::nonce_cleanup::NonceCleanupWorker;
use server::services::order_expiry::OrderExpirySweeper;
use server::services::SettlementCore;

#[actix_web::main]
async fn main() -> Result<()> {
    // 1. Environment and telemetry
    dotenvy::dotenv().ok();
    server::telemetry::init_telemetry().context("Failed to initialize telemetry")?;

    info!("Starting TKOIN settlement server");

    // 2. Configuration; anything set but invalid stops startup here
    let server_config = ServerConfig::from_env().context("Invalid server configuration")?;
    let settlement_config = SettlementConfig::from_env()?;

    // 3. Database
    let pool = create_pool(&server_config.database_url, &server_config.db_encryption_key)
        .context("Failed to create database pool")?;
    run_migrations(&pool).context("Failed to run database migrations")?;
    info!("Database ready");

    // 4. Services
    let chain = Arc::new(
        SolanaRpcReader::new(&server_config.solana_rpc_url, &server_config.tkoin_mint)
            .context("Failed to create Solana RPC reader")?,
    );
    let core = SettlementCore::new(pool.clone(), &settlement_config, chain.clone(), chain)
        .context("Failed to initialize settlement services")?;

    // 5. Background workers
    let sweeper = Arc::new(OrderExpirySweeper::new(
        core.orders.clone(),
        settlement_config.sweep.order_expiry_interval(),
    ));
    tokio::spawn(sweeper.start());

    let nonce_cleanup = Arc::new(NonceCleanupWorker::new(
        pool.clone(),
        settlement_config.sweep.nonce_cleanup_interval(),
    ));
    tokio::spawn(nonce_cleanup.start());

    // 6. HTTP
    let webhook_state = web::Data::new(platform_webhooks::WebhookState {
        verifier: core.verifier.clone(),
        settlements: core.settlements.clone(),
    });
    let pool_data = web::Data::new(pool);
    let core_data = web::Data::new(core);

    info!(bind_address = %server_config.bind_address, "Listening");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(pool_data.clone())
            .app_data(core_data.clone())
            .app_data(webhook_state.clone())
            .service(health::health_check)
            .service(platform_webhooks::receive_platform_webhook)
    })
    .bind(&server_config.bind_address)
    .with_context(|| format!("Failed to bind {}", server_config.bind_address))?
    .run()
    .await
    .context("HTTP server failed")?;

    Ok(())
}
