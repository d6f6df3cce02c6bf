use crate::domain::{
    is_time_ordered, sort_trades_stable, Decimal, HoldingState, Holdings, InstrumentId,
    ProfitAnnotation, Side, Trade, TradeId,
};
use thiserror::Error;
use tracing::debug;

/// Decimal places kept on realized profit rates.
pub const RATE_DECIMAL_PLACES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("trade {trade_id} is malformed: {reason}")]
    InvalidTrade { trade_id: TradeId, reason: String },
    #[error("trade {trade_id} overflows decimal arithmetic")]
    ArithmeticOverflow { trade_id: TradeId },
}

/// Result of folding a batch of trades.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineOutput {
    /// Input trades in processing order, profit fields overwritten.
    pub trades: Vec<Trade>,
    /// Open positions after the last trade. Flat instruments are absent.
    pub holdings: Holdings,
    /// Sales whose profit could not be computed.
    pub unresolved_sales: Vec<TradeId>,
}

/// Weighted-average cost tracker for one (user, exchange) pair.
#[derive(Debug, Clone, Default)]
pub struct CostBasisEngine {
    holdings: Holdings,
    unresolved_sales: Vec<TradeId>,
}

impl CostBasisEngine {
    pub fn new(initial: Holdings) -> Self {
        let holdings = initial
            .into_iter()
            .filter(|(_, state)| !state.is_flat())
            .collect();
        Self {
            holdings,
            unresolved_sales: Vec::new(),
        }
    }

    /// Fold `trades` over `initial` and annotate every trade.
    ///
    /// Trades are sorted by execution time if they are not already; ties keep
    /// their input order. All trades are validated before any is applied, so a
    /// malformed trade leaves no partial result behind.
    pub fn apply(mut trades: Vec<Trade>, initial: Holdings) -> Result<EngineOutput, EngineError> {
        for trade in &trades {
            validate(trade)?;
        }
        if !is_time_ordered(&trades) {
            sort_trades_stable(&mut trades);
        }

        let mut engine = Self::new(initial);
        for trade in &mut trades {
            let annotation = engine.process_trade(trade)?;
            trade.annotate(annotation);
        }

        Ok(EngineOutput {
            trades,
            holdings: engine.holdings,
            unresolved_sales: engine.unresolved_sales,
        })
    }

    /// Apply a single trade to the running holdings.
    ///
    /// Holdings are left untouched when the trade is rejected.
    pub fn process_trade(&mut self, trade: &Trade) -> Result<ProfitAnnotation, EngineError> {
        validate(trade)?;
        let overflow = || EngineError::ArithmeticOverflow { trade_id: trade.id };
        let annotation = match trade.side {
            Side::Buy => {
                self.handle_buy(trade.instrument_id, trade.price, trade.quantity)
                    .ok_or_else(overflow)?;
                ProfitAnnotation::NotApplicable
            }
            Side::Sell => self
                .handle_sell(trade.instrument_id, trade.price, trade.quantity)
                .ok_or_else(overflow)?,
        };
        if annotation == ProfitAnnotation::Unknown {
            self.unresolved_sales.push(trade.id);
        }
        debug!(
            trade_id = %trade.id,
            instrument = %trade.instrument_id,
            side = trade.side.as_str(),
            annotation = ?annotation,
            "Applied trade"
        );
        Ok(annotation)
    }

    /// Returns `None` on overflow, before any mutation.
    fn handle_buy(
        &mut self,
        instrument: InstrumentId,
        price: Decimal,
        qty: Decimal,
    ) -> Option<()> {
        let next = match self.holdings.get(&instrument) {
            Some(prev) => {
                let total_qty = prev.remaining_quantity.checked_add(qty)?;
                if total_qty.is_positive() {
                    let total_cost = prev
                        .avg_cost
                        .checked_mul(prev.remaining_quantity)?
                        .checked_add(price.checked_mul(qty)?)?;
                    HoldingState::new(total_cost.checked_div(total_qty)?, total_qty)
                } else {
                    HoldingState::new(price, qty)
                }
            }
            None => HoldingState::new(price, qty),
        };
        self.holdings.insert(instrument, next);
        Some(())
    }

    /// Returns `None` on overflow, before any mutation.
    fn handle_sell(
        &mut self,
        instrument: InstrumentId,
        price: Decimal,
        qty: Decimal,
    ) -> Option<ProfitAnnotation> {
        let Some(position) = self.holdings.get(&instrument).copied() else {
            return Some(ProfitAnnotation::Unknown);
        };
        if position.is_flat() || position.remaining_quantity < qty {
            return Some(ProfitAnnotation::Unknown);
        }

        let rate = realized_rate(price, position.avg_cost)?;
        let remaining = position.remaining_quantity.checked_sub(qty)?;
        if remaining.is_positive() {
            // Average cost only moves on buys.
            self.holdings
                .insert(instrument, HoldingState::new(position.avg_cost, remaining));
        } else {
            self.holdings.remove(&instrument);
        }

        Some(ProfitAnnotation::Realized {
            rate,
            cost_basis: position.avg_cost,
        })
    }
}

/// `((sell - avg) / avg) * 100`, half-up to 2 places. Zero when `avg` is not positive.
///
/// `None` if an intermediate does not fit in a decimal.
pub fn realized_rate(sell_price: Decimal, avg_cost: Decimal) -> Option<Decimal> {
    if !avg_cost.is_positive() {
        return Some(Decimal::zero());
    }
    let rate = sell_price
        .checked_sub(avg_cost)?
        .checked_div(avg_cost)?
        .checked_mul(Decimal::hundred())?;
    Some(rate.round_half_up(RATE_DECIMAL_PLACES))
}

fn validate(trade: &Trade) -> Result<(), EngineError> {
    let reason = if trade.instrument_id.as_i64() <= 0 {
        "missing instrument reference"
    } else if !trade.price.is_positive() {
        "price must be positive"
    } else if !trade.quantity.is_positive() {
        "quantity must be positive"
    } else {
        return Ok(());
    };
    Err(EngineError::InvalidTrade {
        trade_id: trade.id,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_realized_rate_rounds_half_up() {
        assert_eq!(realized_rate(d("150"), d("100")), Some(d("50.00")));
        assert_eq!(realized_rate(d("30"), d("16")), Some(d("87.50")));
        // 2/3 loss => -66.666.. => -66.67
        assert_eq!(realized_rate(d("1"), d("3")), Some(d("-66.67")));
        // 0.005 sits on the midpoint and must round up.
        assert_eq!(realized_rate(d("1000.05"), d("1000")), Some(d("0.01")));
    }

    #[test]
    fn test_realized_rate_zero_cost_is_zero() {
        assert_eq!(realized_rate(d("10"), Decimal::zero()), Some(Decimal::zero()));
    }

    #[test]
    fn test_new_drops_flat_seed_entries() {
        let mut seed = Holdings::new();
        seed.insert(InstrumentId::new(1), HoldingState::new(d("5"), d("0")));
        seed.insert(InstrumentId::new(2), HoldingState::new(d("5"), d("1")));
        let out = CostBasisEngine::apply(Vec::new(), seed).unwrap();
        assert_eq!(out.holdings.len(), 1);
        assert!(out.holdings.contains_key(&InstrumentId::new(2)));
    }

    #[test]
    fn test_realized_rate_overflow_is_none() {
        // Sale far above a tiny cost basis: the percentage does not fit.
        let rate = realized_rate(
            d("79228162514264337593543950335"),
            d("0.0000000000000000000000000001"),
        );
        assert_eq!(rate, None);
    }
}
