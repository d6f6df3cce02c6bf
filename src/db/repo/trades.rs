//! Trade operations for the repository.

use super::{now_ms, parse_decimal, parse_optional_decimal, Repository};
use crate::domain::{ExchangeCode, InstrumentId, NewTrade, Side, TimeMs, Trade, TradeId, UserId};
use crate::store::{StoreError, TradeStore};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

impl Repository {
    /// Insert trades idempotently in a single transaction.
    ///
    /// Duplicates on (user, exchange, external trade id) are skipped.
    /// Returns the number of newly inserted trades.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_trades_batch(&self, trades: &[NewTrade]) -> Result<usize, sqlx::Error> {
        if trades.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool.begin().await?;
        let created_at = now_ms();

        for trade in trades {
            let result = sqlx::query(
                r#"
                INSERT INTO trading_histories (
                    user_id, exchange_code, external_trade_id, instrument_id, side,
                    price, quantity, fee, trade_time_ms, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, exchange_code, external_trade_id) DO NOTHING
                "#,
            )
            .bind(trade.user_id.to_string())
            .bind(trade.exchange.code())
            .bind(trade.external_trade_id.as_str())
            .bind(trade.instrument_id.as_i64())
            .bind(trade.side.as_str())
            .bind(trade.price.to_canonical_string())
            .bind(trade.quantity.to_canonical_string())
            .bind(trade.fee.to_canonical_string())
            .bind(trade.time_ms.as_ms())
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }
}

fn row_to_trade(
    row: &SqliteRow,
    user: UserId,
    exchange: ExchangeCode,
) -> Result<Trade, StoreError> {
    let id: i64 = row.get("id");
    let side_str: String = row.get("side");
    let side = Side::parse(&side_str)
        .ok_or_else(|| StoreError::Corrupt(format!("trade {} has side {:?}", id, side_str)))?;

    Ok(Trade {
        id: TradeId::new(id),
        user_id: user,
        exchange,
        external_trade_id: row.get("external_trade_id"),
        instrument_id: InstrumentId::new(row.get("instrument_id")),
        side,
        price: parse_decimal("price", &row.get::<String, _>("price"), id)?,
        quantity: parse_decimal("quantity", &row.get::<String, _>("quantity"), id)?,
        fee: parse_decimal("fee", &row.get::<String, _>("fee"), id)?,
        time_ms: TimeMs::new(row.get("trade_time_ms")),
        profit_loss_rate: parse_optional_decimal(
            "profit_loss_rate",
            row.get("profit_loss_rate"),
            id,
        )?,
        avg_buy_price: parse_optional_decimal("avg_buy_price", row.get("avg_buy_price"), id)?,
    })
}

/// Overwrite profit columns by trade id. Returns the number of rows touched.
pub(super) async fn write_profit_fields(
    conn: &mut SqliteConnection,
    trades: &[Trade],
) -> Result<usize, sqlx::Error> {
    let mut updated = 0usize;
    for trade in trades {
        let result = sqlx::query(
            r#"
            UPDATE trading_histories
            SET profit_loss_rate = ?, avg_buy_price = ?
            WHERE id = ?
            "#,
        )
        .bind(trade.profit_loss_rate.map(|d| d.to_canonical_string()))
        .bind(trade.avg_buy_price.map(|d| d.to_canonical_string()))
        .bind(trade.id.as_i64())
        .execute(&mut *conn)
        .await?;
        updated += result.rows_affected() as usize;
    }
    Ok(updated)
}

#[async_trait]
impl TradeStore for Repository {
    async fn list_trades(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
    ) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, external_trade_id, instrument_id, side, price, quantity, fee,
                   trade_time_ms, profit_loss_rate, avg_buy_price
            FROM trading_histories
            WHERE user_id = ? AND exchange_code = ?
            ORDER BY trade_time_ms ASC, id ASC
            "#,
        )
        .bind(user.to_string())
        .bind(exchange.code())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row_to_trade(row, *user, exchange))
            .collect()
    }

    async fn upsert_profit_fields(&self, trades: &[Trade]) -> Result<usize, StoreError> {
        if trades.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let updated = write_profit_fields(&mut tx, trades).await?;
        tx.commit().await?;
        Ok(updated)
    }
}
