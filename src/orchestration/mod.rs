pub mod pair_lock;
pub mod recompute;

pub use pair_lock::PairLocks;
pub use recompute::{
    plan_cycle, CyclePlan, ProfitRecomputer, RecomputeError, RecomputeMode, RecomputeSummary,
};
