pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod store;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, ExchangeCode, Holding, HoldingState, Holdings, HoldingsSnapshot, InstrumentId,
    NewTrade, ProfitAnnotation, Side, TimeMs, Trade, TradeId, UserId,
};
pub use engine::{CostBasisEngine, EngineError, EngineOutput};
pub use error::AppError;
pub use orchestration::{ProfitRecomputer, RecomputeError, RecomputeMode, RecomputeSummary};
pub use store::{InMemoryStore, LedgerStore, StoreError};
