//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `trades.rs` - Trade ingestion, listing and profit field updates
//! - `holdings.rs` - Holdings snapshot, watermark and instrument operations

mod holdings;
mod trades;

use crate::domain::Decimal;
use crate::store::{CycleCommit, LedgerStore, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::str::FromStr;
use tracing::warn;

pub use holdings::NewInstrument;

/// SQLite-backed ledger store.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Parse a stored decimal column.
///
/// A value that does not parse is reported as a corrupt row, never replaced by
/// a default, so no profit figure is derived from it.
fn parse_decimal(column: &str, raw: &str, row_key: i64) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|e| {
        warn!(column, row = row_key, value = %raw, error = %e, "Corrupt decimal column");
        StoreError::Corrupt(format!("{} of row {} is not a decimal: {:?}", column, row_key, raw))
    })
}

fn parse_optional_decimal(
    column: &str,
    raw: Option<String>,
    row_key: i64,
) -> Result<Option<Decimal>, StoreError> {
    raw.map(|s| parse_decimal(column, &s, row_key)).transpose()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl LedgerStore for Repository {
    /// All writes of a cycle in one transaction; any failure rolls back everything.
    async fn commit_cycle(&self, commit: &CycleCommit) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;

        trades::write_profit_fields(&mut tx, &commit.trades).await?;
        holdings::write_holdings(&mut tx, &commit.user, commit.exchange, &commit.holdings)
            .await?;
        if let Some(ms) = commit.last_applied_ms {
            holdings::write_watermark(&mut tx, &commit.user, commit.exchange, ms).await?;
        }
        let deleted =
            holdings::delete_except(&mut tx, &commit.user, commit.exchange, &commit.keep_set())
                .await?;

        tx.commit().await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod test_support {
    use super::{NewInstrument, Repository};
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    /// Fresh database with instruments 1, 2 and 3 registered.
    pub async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Repository::new(pool);
        for symbol in ["BTC", "ETH", "XRP"] {
            repo.insert_instrument(&NewInstrument {
                symbol: symbol.to_string(),
                quote_currency: "KRW".to_string(),
                market_code: None,
            })
            .await
            .unwrap();
        }
        (repo, temp_dir)
    }
}
