//! One recompute cycle for a (user, exchange) pair.

use crate::domain::{
    ExchangeCode, Holding, Holdings, HoldingsSnapshot, Side, Trade, TradeId, UserId,
};
use crate::engine::{CostBasisEngine, EngineError};
use crate::orchestration::pair_lock::PairLocks;
use crate::store::{CycleCommit, LedgerStore, StoreError, UNKNOWN_SYMBOL};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecomputeMode {
    /// Replay the whole history from no position.
    Full,
    /// Resume from the snapshot with trades after its watermark.
    Incremental,
}

/// Counts reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeSummary {
    pub updated_count: usize,
    pub holdings_count: usize,
    pub deleted_holdings_count: usize,
    pub mode: RecomputeMode,
}

impl RecomputeSummary {
    fn empty() -> Self {
        Self {
            updated_count: 0,
            holdings_count: 0,
            deleted_holdings_count: 0,
            mode: RecomputeMode::Full,
        }
    }
}

#[derive(Debug, Error)]
pub enum RecomputeError {
    #[error(transparent)]
    Validation(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("recompute cycle exceeded deadline of {0:?}")]
    Timeout(Duration),
}

impl RecomputeError {
    /// Storage failures and timeouts can be retried with a fresh cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            RecomputeError::Validation(_) => false,
            RecomputeError::Store(e) => e.is_retryable(),
            RecomputeError::Timeout(_) => true,
        }
    }
}

/// What the engine is fed in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePlan {
    pub mode: RecomputeMode,
    pub seed: Holdings,
    pub pending: Vec<Trade>,
}

/// Pick full or incremental mode from the snapshot alone.
///
/// A snapshot without positions, or one with positions but no watermark,
/// cannot be resumed from and triggers a full replay.
pub fn plan_cycle(trades: Vec<Trade>, snapshot: HoldingsSnapshot) -> CyclePlan {
    match snapshot.last_applied_ms {
        Some(watermark) if !snapshot.is_empty() => CyclePlan {
            mode: RecomputeMode::Incremental,
            seed: snapshot.positions,
            pending: trades
                .into_iter()
                .filter(|t| t.time_ms > watermark)
                .collect(),
        },
        _ => CyclePlan {
            mode: RecomputeMode::Full,
            seed: Holdings::new(),
            pending: trades,
        },
    }
}

/// Runs recompute cycles against a ledger store.
///
/// Stateless apart from the per-pair locks; safe to share across tasks.
#[derive(Clone)]
pub struct ProfitRecomputer {
    store: Arc<dyn LedgerStore>,
    locks: PairLocks,
    deadline: Duration,
}

impl ProfitRecomputer {
    pub fn new(store: Arc<dyn LedgerStore>, deadline: Duration) -> Self {
        Self {
            store,
            locks: PairLocks::new(),
            deadline,
        }
    }

    pub fn locks(&self) -> &PairLocks {
        &self.locks
    }

    /// Recompute profit annotations and holdings for one pair.
    ///
    /// `hint_is_initial` is advisory; the mode is always derived from the
    /// persisted snapshot.
    pub async fn recompute(
        &self,
        user: UserId,
        exchange: ExchangeCode,
        hint_is_initial: Option<bool>,
    ) -> Result<RecomputeSummary, RecomputeError> {
        let _guard = self.locks.acquire(user, exchange).await;
        tokio::time::timeout(self.deadline, self.run_cycle(user, exchange, hint_is_initial))
            .await
            .map_err(|_| RecomputeError::Timeout(self.deadline))?
    }

    async fn run_cycle(
        &self,
        user: UserId,
        exchange: ExchangeCode,
        hint_is_initial: Option<bool>,
    ) -> Result<RecomputeSummary, RecomputeError> {
        let trades = self.store.list_trades(&user, exchange).await?;
        if trades.is_empty() {
            debug!(user = %user, exchange = %exchange, "No trades to recompute");
            return Ok(RecomputeSummary::empty());
        }

        let snapshot = self.store.get_snapshot(&user, exchange).await?;
        let previous_watermark = snapshot.last_applied_ms;
        let previous_holdings = snapshot.positions.len();
        let plan = plan_cycle(trades, snapshot);

        if let Some(hint) = hint_is_initial {
            if hint != (plan.mode == RecomputeMode::Full) {
                info!(
                    user = %user,
                    exchange = %exchange,
                    hint_is_initial = hint,
                    mode = ?plan.mode,
                    "Caller mode hint disagrees with snapshot, using snapshot"
                );
            }
        }

        if plan.pending.is_empty() {
            info!(
                user = %user,
                exchange = %exchange,
                holdings = previous_holdings,
                "Snapshot already covers every trade"
            );
            return Ok(RecomputeSummary {
                updated_count: 0,
                holdings_count: previous_holdings,
                deleted_holdings_count: 0,
                mode: plan.mode,
            });
        }

        let stored_fields: HashMap<TradeId, _> = plan
            .pending
            .iter()
            .map(|t| (t.id, t.profit_fields()))
            .collect();
        let pending_count = plan.pending.len();

        let output = CostBasisEngine::apply(plan.pending, plan.seed)?;

        log_unresolved_sales(&user, exchange, &output.trades, &output.unresolved_sales);

        let last_applied_ms = output
            .trades
            .last()
            .map(|t| t.time_ms)
            .max(previous_watermark);
        let changed: Vec<Trade> = output
            .trades
            .into_iter()
            .filter(|t| stored_fields.get(&t.id) != Some(&t.profit_fields()))
            .collect();

        let mut holdings = Vec::with_capacity(output.holdings.len());
        for (instrument_id, state) in output.holdings {
            let symbol = self
                .store
                .symbol_for(instrument_id)
                .await?
                .unwrap_or_else(|| UNKNOWN_SYMBOL.to_string());
            holdings.push(Holding {
                instrument_id,
                symbol,
                state,
            });
        }

        let commit = CycleCommit {
            user,
            exchange,
            trades: changed,
            holdings,
            last_applied_ms,
        };
        let deleted = self.store.commit_cycle(&commit).await?;

        let summary = RecomputeSummary {
            updated_count: commit.trades.len(),
            holdings_count: commit.holdings.len(),
            deleted_holdings_count: deleted,
            mode: plan.mode,
        };
        info!(
            user = %user,
            exchange = %exchange,
            mode = ?summary.mode,
            processed = pending_count,
            updated = summary.updated_count,
            holdings = summary.holdings_count,
            deleted = summary.deleted_holdings_count,
            watermark = ?last_applied_ms,
            "Recompute cycle committed"
        );
        Ok(summary)
    }
}

fn log_unresolved_sales(
    user: &UserId,
    exchange: ExchangeCode,
    trades: &[Trade],
    unresolved: &[TradeId],
) {
    if unresolved.is_empty() {
        return;
    }
    let unresolved: HashSet<&TradeId> = unresolved.iter().collect();
    for trade in trades
        .iter()
        .filter(|t| t.side == Side::Sell && unresolved.contains(&t.id))
    {
        warn!(
            user = %user,
            exchange = %exchange,
            instrument = %trade.instrument_id,
            trade_id = %trade.id,
            quantity = %trade.quantity,
            "Sale exceeds tracked position, profit left unknown"
        );
    }
}
