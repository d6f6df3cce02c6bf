//! Pure computation engine for cost-basis and realized profit.

pub mod cost_basis;

pub use cost_basis::{
    realized_rate, CostBasisEngine, EngineError, EngineOutput, RATE_DECIMAL_PLACES,
};
