//! Domain types for the trade profit ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, UserId, ExchangeCode, InstrumentId, TradeId, Side
//! - Trade and holdings types
//! - Stable trade ordering helpers

pub mod decimal;
pub mod holding;
pub mod ordering;
pub mod primitives;
pub mod trade;

pub use decimal::Decimal;
pub use holding::{Holding, HoldingState, Holdings, HoldingsSnapshot};
pub use ordering::{is_time_ordered, sort_trades_stable};
pub use primitives::{
    ExchangeCode, InstrumentId, Side, TimeMs, TradeId, UnknownExchangeCode, UserId,
};
pub use trade::{NewTrade, ProfitAnnotation, Trade};
