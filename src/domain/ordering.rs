//! Stable trade ordering for deterministic processing.

use crate::domain::Trade;

/// Returns true if `trades` is already ascending by execution time.
pub fn is_time_ordered(trades: &[Trade]) -> bool {
    trades.windows(2).all(|w| w[0].time_ms <= w[1].time_ms)
}

/// Sort trades ascending by execution time.
///
/// Stable: trades sharing a timestamp keep their input order.
pub fn sort_trades_stable(trades: &mut [Trade]) {
    trades.sort_by_key(|t| t.time_ms);
}
