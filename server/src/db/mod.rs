//! SQLite connection pool and schema migrations

use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{SettlementError, SettlementResult};

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Applies the optional encryption key and the per-connection PRAGMAs
#[derive(Debug, Clone)]
struct SettlementConnectionCustomizer {
    encryption_key: String,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for SettlementConnectionCustomizer
{
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        // Must be the first statement on the connection
        if !self.encryption_key.is_empty() {
            sql_query(format!("PRAGMA key = '{}';", self.encryption_key.replace('\'', "''")))
                .execute(conn)
                .map_err(diesel::r2d2::Error::QueryError)?;
        }

        // Writers queue on the lock instead of failing with SQLITE_BUSY
        sql_query("PRAGMA busy_timeout = 10000;")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;

        sql_query("PRAGMA journal_mode = WAL;")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;

        sql_query("PRAGMA synchronous = NORMAL;")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;

        sql_query("PRAGMA foreign_keys = ON;")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;

        Ok(())
    }
}

/// Create the connection pool
///
/// `encryption_key` is applied as `PRAGMA key` when non-empty, which
/// requires a SQLCipher-enabled libsqlite3.
pub fn create_pool(database_url: &str, encryption_key: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let customizer = SettlementConnectionCustomizer {
        encryption_key: encryption_key.to_string(),
    };

    r2d2::Pool::builder()
        .max_size(16)
        .connection_timeout(std::time::Duration::from_secs(30))
        .connection_customizer(Box::new(customizer))
        .build(manager)
        .context("Failed to create database connection pool")
}

/// Apply pending embedded migrations
pub fn run_migrations(pool: &DbPool) -> Result<()> {
    let mut conn = pool.get().context("Failed to get DB connection for migrations")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;
    for version in applied {
        tracing::info!(migration = %version, "Applied database migration");
    }
    Ok(())
}

/// Run `f` on a pooled connection inside `spawn_blocking`
pub async fn with_conn<T, F>(pool: &DbPool, f: F) -> SettlementResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> SettlementResult<T> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await?
}

/// Run `f` inside an immediate (write-locking) transaction
///
/// Taking the write lock up front keeps concurrent read-then-write
/// sequences from failing on lock upgrade.
pub fn write_txn<T, F>(conn: &mut SqliteConnection, f: F) -> SettlementResult<T>
where
    F: FnOnce(&mut SqliteConnection) -> SettlementResult<T>,
{
    conn.immediate_transaction::<T, SettlementError, _>(f)
}
