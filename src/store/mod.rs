//! Storage contracts the recompute controller depends on.
//!
//! The engine never touches these; the controller loads trades and the
//! holdings snapshot through them and commits one cycle's results at once.

use crate::domain::{
    ExchangeCode, Holding, HoldingsSnapshot, InstrumentId, Trade, TimeMs, UserId,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryStore;

/// Symbol used for holdings whose instrument cannot be resolved.
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Storage failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether re-running the whole cycle may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::Corrupt(_))
    }
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    /// All trades for the pair, ascending by execution time.
    async fn list_trades(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
    ) -> Result<Vec<Trade>, StoreError>;

    /// Overwrite the profit columns of the given trades, keyed by trade id.
    async fn upsert_profit_fields(&self, trades: &[Trade]) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait HoldingsStore: Send + Sync {
    async fn get_snapshot(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
    ) -> Result<HoldingsSnapshot, StoreError>;

    /// Insert or replace holdings and move the resume watermark.
    async fn upsert_holdings(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
        holdings: &[Holding],
        last_applied_ms: Option<TimeMs>,
    ) -> Result<(), StoreError>;

    /// Remove every holding of the pair whose instrument is not in `keep`.
    /// Returns the number removed.
    async fn delete_holdings_except(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
        keep: &BTreeSet<InstrumentId>,
    ) -> Result<usize, StoreError>;

    /// Persisted holdings with their symbols, ordered by instrument id.
    async fn list_holdings(
        &self,
        user: &UserId,
        exchange: ExchangeCode,
    ) -> Result<Vec<Holding>, StoreError>;
}

#[async_trait]
pub trait InstrumentResolver: Send + Sync {
    async fn symbol_for(&self, instrument: InstrumentId) -> Result<Option<String>, StoreError>;
}

/// Everything one recompute cycle writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleCommit {
    pub user: UserId,
    pub exchange: ExchangeCode,
    /// Trades whose profit fields changed.
    pub trades: Vec<Trade>,
    /// Open positions after the cycle.
    pub holdings: Vec<Holding>,
    pub last_applied_ms: Option<TimeMs>,
}

impl CycleCommit {
    pub fn keep_set(&self) -> BTreeSet<InstrumentId> {
        self.holdings
            .iter()
            .filter(|h| !h.state.is_flat())
            .map(|h| h.instrument_id)
            .collect()
    }
}

/// A store that can persist a whole cycle atomically.
#[async_trait]
pub trait LedgerStore: TradeStore + HoldingsStore + InstrumentResolver {
    /// Apply trade updates, holdings upserts, the watermark and stale-holding
    /// deletion as one unit. Returns the number of holdings deleted.
    async fn commit_cycle(&self, commit: &CycleCommit) -> Result<usize, StoreError>;
}
