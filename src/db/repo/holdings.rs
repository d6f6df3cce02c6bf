//! Holdings snapshot, resume watermark and instrument operations for the repository.

use super::{now_ms, parse_decimal, Repository};
use crate::domain::{
    ExchangeCode, Holding, HoldingState, Holdings, HoldingsSnapshot, InstrumentId, TimeMs, UserId,
};
use crate::store::{HoldingsStore, InstrumentResolver, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use std::collections::BTreeSet;

/// Instrument registration payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInstrument {
    pub symbol: String,
    pub quote_currency: String,
    pub market_code: Option<String>,
}

impl Repository {
    /// Register an instrument, returning its id.
    ///
    /// Re-registering an existing market code returns the existing id.
    pub async fn insert_instrument(
        &self,
        instrument: &NewInstrument,
    ) -> Result<InstrumentId, sqlx::Error> {
        if let Some(market_code) = &instrument.market_code {
            let existing = sqlx::query("SELECT id FROM instruments WHERE market_code = ?")
                .bind(market_code)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = existing {
                return Ok(InstrumentId::new(row.get("id")));
            }
        }

        let result = sqlx::query(
            r#"
            INSERT INTO instruments (symbol, quote_currency, market_code, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(instrument.symbol.as_str())
        .bind(instrument.quote_currency.as_str())
        .bind(instrument.market_code.as_deref())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        Ok(InstrumentId::new(result.last_insert_rowid()))
    }

    async fn load_holdings(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
    ) -> Result<Vec<Holding>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT instrument_id, symbol, avg_buy_price, remaining_quantity
            FROM coin_holdings
            WHERE user_id = ? AND exchange_code = ?
            ORDER BY instrument_id ASC
            "#,
        )
        .bind(user.to_string())
        .bind(exchange.code())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let instrument_id: i64 = row.get("instrument_id");
                let avg: String = row.get("avg_buy_price");
                let qty: String = row.get("remaining_quantity");
                Ok(Holding {
                    instrument_id: InstrumentId::new(instrument_id),
                    symbol: row.get("symbol"),
                    state: HoldingState::new(
                        parse_decimal("avg_buy_price", &avg, instrument_id)?,
                        parse_decimal("remaining_quantity", &qty, instrument_id)?,
                    ),
                })
            })
            .collect()
    }
}

pub(super) async fn write_holdings(
    conn: &mut SqliteConnection,
    user: &UserId,
    exchange: ExchangeCode,
    holdings: &[Holding],
) -> Result<(), sqlx::Error> {
    let updated_at = now_ms();
    for holding in holdings {
        sqlx::query(
            r#"
            INSERT INTO coin_holdings
            (user_id, exchange_code, instrument_id, symbol, avg_buy_price, remaining_quantity, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, exchange_code, instrument_id) DO UPDATE SET
                symbol = excluded.symbol,
                avg_buy_price = excluded.avg_buy_price,
                remaining_quantity = excluded.remaining_quantity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user.to_string())
        .bind(exchange.code())
        .bind(holding.instrument_id.as_i64())
        .bind(holding.symbol.as_str())
        .bind(holding.state.avg_cost.to_canonical_string())
        .bind(holding.state.remaining_quantity.to_canonical_string())
        .bind(updated_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub(super) async fn write_watermark(
    conn: &mut SqliteConnection,
    user: &UserId,
    exchange: ExchangeCode,
    last_applied_ms: TimeMs,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO holdings_watermark (user_id, exchange_code, last_applied_ms, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id, exchange_code) DO UPDATE SET
            last_applied_ms = excluded.last_applied_ms,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user.to_string())
    .bind(exchange.code())
    .bind(last_applied_ms.as_ms())
    .bind(now_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Delete the pair's holdings outside `keep`. Returns the number deleted.
pub(super) async fn delete_except(
    conn: &mut SqliteConnection,
    user: &UserId,
    exchange: ExchangeCode,
    keep: &BTreeSet<InstrumentId>,
) -> Result<usize, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT instrument_id FROM coin_holdings WHERE user_id = ? AND exchange_code = ?",
    )
    .bind(user.to_string())
    .bind(exchange.code())
    .fetch_all(&mut *conn)
    .await?;

    let mut deleted = 0usize;
    for row in rows {
        let instrument_id = InstrumentId::new(row.get("instrument_id"));
        if keep.contains(&instrument_id) {
            continue;
        }
        let result = sqlx::query(
            "DELETE FROM coin_holdings WHERE user_id = ? AND exchange_code = ? AND instrument_id = ?",
        )
        .bind(user.to_string())
        .bind(exchange.code())
        .bind(instrument_id.as_i64())
        .execute(&mut *conn)
        .await?;
        deleted += result.rows_affected() as usize;
    }
    Ok(deleted)
}

#[async_trait]
impl HoldingsStore for Repository {
    async fn get_snapshot(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
    ) -> Result<HoldingsSnapshot, StoreError> {
        let positions: Holdings = self
            .load_holdings(user, exchange)
            .await?
            .into_iter()
            .map(|h| (h.instrument_id, h.state))
            .collect();

        let watermark = sqlx::query(
            "SELECT last_applied_ms FROM holdings_watermark WHERE user_id = ? AND exchange_code = ?",
        )
        .bind(user.to_string())
        .bind(exchange.code())
        .fetch_optional(&self.pool)
        .await?
        .map(|row| TimeMs::new(row.get("last_applied_ms")));

        Ok(HoldingsSnapshot::new(positions, watermark))
    }

    async fn upsert_holdings(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
        holdings: &[Holding],
        last_applied_ms: Option<TimeMs>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        write_holdings(&mut tx, user, exchange, holdings).await?;
        if let Some(ms) = last_applied_ms {
            write_watermark(&mut tx, user, exchange, ms).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_holdings_except(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
        keep: &BTreeSet<InstrumentId>,
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let deleted = delete_except(&mut tx, user, exchange, keep).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn list_holdings(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
    ) -> Result<Vec<Holding>, StoreError> {
        self.load_holdings(user, exchange).await
    }
}

#[async_trait]
impl InstrumentResolver for Repository {
    async fn symbol_for(&self, instrument: InstrumentId) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT symbol FROM instruments WHERE id = ?")
            .bind(instrument.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("symbol")))
    }
}
