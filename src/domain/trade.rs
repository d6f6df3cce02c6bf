//! Trade type representing a single executed buy or sell.

use crate::domain::{Decimal, ExchangeCode, InstrumentId, Side, TimeMs, TradeId, UserId};
use serde::{Deserialize, Serialize};

/// Outcome of running a trade through the cost-basis engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfitAnnotation {
    /// Buys never realize profit.
    NotApplicable,
    /// Sale with no tracked position, or selling more than is tracked.
    Unknown,
    /// Sale against a tracked position.
    Realized {
        /// Percentage, rounded half-up to 2 decimal places.
        rate: Decimal,
        /// Average cost the rate was computed against.
        cost_basis: Decimal,
    },
}

/// A stored trade execution plus its engine-owned profit fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: TradeId,
    pub user_id: UserId,
    pub exchange: ExchangeCode,
    /// Exchange-provided execution id, unique per (user, exchange).
    pub external_trade_id: String,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub time_ms: TimeMs,
    pub profit_loss_rate: Option<Decimal>,
    pub avg_buy_price: Option<Decimal>,
}

impl Trade {
    /// Overwrite the profit fields from an engine annotation.
    pub fn annotate(&mut self, annotation: ProfitAnnotation) {
        match annotation {
            ProfitAnnotation::NotApplicable | ProfitAnnotation::Unknown => {
                self.profit_loss_rate = None;
                self.avg_buy_price = None;
            }
            ProfitAnnotation::Realized { rate, cost_basis } => {
                self.profit_loss_rate = Some(rate);
                self.avg_buy_price = Some(cost_basis);
            }
        }
    }

    /// The persisted pair of profit columns.
    pub fn profit_fields(&self) -> (Option<Decimal>, Option<Decimal>) {
        (self.profit_loss_rate, self.avg_buy_price)
    }
}

/// A trade as handed over by ingestion, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrade {
    pub user_id: UserId,
    pub exchange: ExchangeCode,
    pub external_trade_id: String,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub time_ms: TimeMs,
}

impl NewTrade {
    /// Materialize with a store id and empty profit fields.
    pub fn into_trade(self, id: TradeId) -> Trade {
        Trade {
            id,
            user_id: self.user_id,
            exchange: self.exchange,
            external_trade_id: self.external_trade_id,
            instrument_id: self.instrument_id,
            side: self.side,
            price: self.price,
            quantity: self.quantity,
            fee: self.fee,
            time_ms: self.time_ms,
            profit_loss_rate: None,
            avg_buy_price: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn new_trade() -> NewTrade {
        NewTrade {
            user_id: UserId::new(Uuid::nil()),
            exchange: ExchangeCode::Upbit,
            external_trade_id: "ext-1".to_string(),
            instrument_id: InstrumentId::new(7),
            side: Side::Sell,
            price: d("150"),
            quantity: d("1"),
            fee: d("0.05"),
            time_ms: TimeMs::new(1000),
        }
    }

    #[test]
    fn test_annotate_realized_then_unknown_clears_fields() {
        let mut trade = new_trade().into_trade(TradeId::new(1));
        trade.annotate(ProfitAnnotation::Realized {
            rate: d("50.00"),
            cost_basis: d("100"),
        });
        assert_eq!(trade.profit_fields(), (Some(d("50")), Some(d("100"))));

        trade.annotate(ProfitAnnotation::Unknown);
        assert_eq!(trade.profit_fields(), (None, None));
    }

    #[test]
    fn test_trade_serializes_camel_case_with_string_decimals() {
        let trade = new_trade().into_trade(TradeId::new(3));
        let json = serde_json::to_value(&trade).unwrap();
        assert_eq!(json["externalTradeId"], "ext-1");
        assert_eq!(json["price"], "150");
        assert_eq!(json["exchange"], 1);
        assert!(json["profitLossRate"].is_null());
    }
}
