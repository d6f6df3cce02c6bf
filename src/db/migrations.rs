//! Ledger schema bootstrap.
//!
//! The schema is applied idempotently on every start. Connections enforce
//! foreign keys so trades can only reference registered instruments.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Tables a cycle reads or writes. Startup fails if any is missing after migration.
const LEDGER_TABLES: [&str; 4] = [
    "instruments",
    "trading_histories",
    "coin_holdings",
    "holdings_watermark",
];

/// Open (creating if needed) the ledger database and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "Could not create database directory");
            }
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    apply_schema(&pool).await?;
    verify_ledger_tables(&pool).await?;

    info!(path = db_path, "Ledger database ready");
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let schema_sql = include_str!("schema.sql");
    let mut applied = 0usize;
    for statement in schema_sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement).execute(pool).await?;
        applied += 1;
    }
    info!(statements = applied, "Ledger schema applied");
    Ok(())
}

async fn verify_ledger_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for table in LEDGER_TABLES {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(pool)
                .await?;
        if found.is_none() {
            return Err(sqlx::Error::Protocol(format!(
                "ledger table {} missing after migration",
                table
            )));
        }
    }
    Ok(())
}
