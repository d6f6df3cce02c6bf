//! In-process ledger store, for tests and embedding without a database.

use super::{
    CycleCommit, HoldingsStore, InstrumentResolver, LedgerStore, StoreError, TradeStore,
};
use crate::domain::{
    sort_trades_stable, ExchangeCode, Holding, Holdings, HoldingsSnapshot, InstrumentId,
    NewTrade, TimeMs, Trade, TradeId, UserId,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

type PairKey = (UserId, ExchangeCode);

#[derive(Debug, Default)]
struct Inner {
    trades: Vec<Trade>,
    next_trade_id: i64,
    holdings: HashMap<PairKey, BTreeMap<InstrumentId, Holding>>,
    watermarks: HashMap<PairKey, TimeMs>,
    instruments: BTreeMap<InstrumentId, String>,
}

/// Store holding all state in memory behind a mutex.
///
/// `commit_cycle` stages nothing outside the lock, so a cycle is applied
/// entirely or not at all.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    commit_delay: Option<Duration>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instrument symbol.
    pub fn with_instrument(self, id: InstrumentId, symbol: &str) -> Self {
        self.lock().instruments.insert(id, symbol.to_string());
        self
    }

    /// Sleep this long inside `commit_cycle` before writing anything.
    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    /// Make every subsequent operation fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Idempotent ingestion keyed on (user, exchange, external trade id).
    /// Returns the number of newly stored trades.
    pub fn insert_trades(&self, trades: &[NewTrade]) -> usize {
        let mut inner = self.lock();
        let mut inserted = 0;
        for new_trade in trades {
            let duplicate = inner.trades.iter().any(|t| {
                t.user_id == new_trade.user_id
                    && t.exchange == new_trade.exchange
                    && t.external_trade_id == new_trade.external_trade_id
            });
            if duplicate {
                continue;
            }
            inner.next_trade_id += 1;
            let id = TradeId::new(inner.next_trade_id);
            inner.trades.push(new_trade.clone().into_trade(id));
            inserted += 1;
        }
        inserted
    }

    /// Seed a holdings snapshot directly, bypassing a cycle.
    pub fn seed_snapshot(
        &self,
        user: UserId,
        exchange: ExchangeCode,
        positions: &Holdings,
        last_applied_ms: Option<TimeMs>,
    ) {
        let mut inner = self.lock();
        let rows = positions
            .iter()
            .map(|(id, state)| {
                let symbol = inner
                    .instruments
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| super::UNKNOWN_SYMBOL.to_string());
                (
                    *id,
                    Holding {
                        instrument_id: *id,
                        symbol,
                        state: *state,
                    },
                )
            })
            .collect();
        inner.holdings.insert((user, exchange), rows);
        match last_applied_ms {
            Some(ms) => inner.watermarks.insert((user, exchange), ms),
            None => inner.watermarks.remove(&(user, exchange)),
        };
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a test thread panicked mid-operation.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

fn write_profit_fields(inner: &mut Inner, trades: &[Trade]) -> usize {
    let mut updated = 0;
    for trade in trades {
        if let Some(stored) = inner.trades.iter_mut().find(|t| t.id == trade.id) {
            stored.profit_loss_rate = trade.profit_loss_rate;
            stored.avg_buy_price = trade.avg_buy_price;
            updated += 1;
        }
    }
    updated
}

fn write_holdings(
    inner: &mut Inner,
    user: UserId,
    exchange: ExchangeCode,
    holdings: &[Holding],
    last_applied_ms: Option<TimeMs>,
) {
    let rows = inner.holdings.entry((user, exchange)).or_default();
    for holding in holdings {
        rows.insert(holding.instrument_id, holding.clone());
    }
    if let Some(ms) = last_applied_ms {
        inner.watermarks.insert((user, exchange), ms);
    }
}

fn remove_holdings_except(
    inner: &mut Inner,
    user: UserId,
    exchange: ExchangeCode,
    keep: &BTreeSet<InstrumentId>,
) -> usize {
    let Some(rows) = inner.holdings.get_mut(&(user, exchange)) else {
        return 0;
    };
    let before = rows.len();
    rows.retain(|id, _| keep.contains(id));
    before - rows.len()
}

#[async_trait]
impl TradeStore for InMemoryStore {
    async fn list_trades(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
    ) -> Result<Vec<Trade>, StoreError> {
        self.check_available()?;
        let mut trades: Vec<Trade> = self
            .lock()
            .trades
            .iter()
            .filter(|t| t.user_id == *user && t.exchange == exchange)
            .cloned()
            .collect();
        sort_trades_stable(&mut trades);
        Ok(trades)
    }

    async fn upsert_profit_fields(&self, trades: &[Trade]) -> Result<usize, StoreError> {
        self.check_available()?;
        Ok(write_profit_fields(&mut self.lock(), trades))
    }
}

#[async_trait]
impl HoldingsStore for InMemoryStore {
    async fn get_snapshot(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
    ) -> Result<HoldingsSnapshot, StoreError> {
        self.check_available()?;
        let inner = self.lock();
        let positions = inner
            .holdings
            .get(&(*user, exchange))
            .map(|rows| rows.iter().map(|(id, h)| (*id, h.state)).collect())
            .unwrap_or_default();
        let last_applied_ms = inner.watermarks.get(&(*user, exchange)).copied();
        Ok(HoldingsSnapshot::new(positions, last_applied_ms))
    }

    async fn upsert_holdings(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
        holdings: &[Holding],
        last_applied_ms: Option<TimeMs>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        write_holdings(&mut self.lock(), *user, exchange, holdings, last_applied_ms);
        Ok(())
    }

    async fn delete_holdings_except(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
        keep: &BTreeSet<InstrumentId>,
    ) -> Result<usize, StoreError> {
        self.check_available()?;
        Ok(remove_holdings_except(&mut self.lock(), *user, exchange, keep))
    }

    async fn list_holdings(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
    ) -> Result<Vec<Holding>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()
            .holdings
            .get(&(*user, exchange))
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl InstrumentResolver for InMemoryStore {
    async fn symbol_for(&self, instrument: InstrumentId) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        Ok(self.lock().instruments.get(&instrument).cloned())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn commit_cycle(&self, commit: &CycleCommit) -> Result<usize, StoreError> {
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;

        let mut inner = self.lock();
        write_profit_fields(&mut inner, &commit.trades);
        write_holdings(
            &mut inner,
            commit.user,
            commit.exchange,
            &commit.holdings,
            commit.last_applied_ms,
        );
        Ok(remove_holdings_except(
            &mut inner,
            commit.user,
            commit.exchange,
            &commit.keep_set(),
        ))
    }
}
