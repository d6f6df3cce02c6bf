//! Per-instrument running position and the persisted holdings snapshot.

use crate::domain::{Decimal, InstrumentId, TimeMs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running tally for one instrument.
///
/// `avg_cost` is only meaningful while `remaining_quantity > 0`; a flat
/// instrument is represented by absence from the holdings map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingState {
    pub avg_cost: Decimal,
    pub remaining_quantity: Decimal,
}

impl HoldingState {
    pub fn new(avg_cost: Decimal, remaining_quantity: Decimal) -> Self {
        Self {
            avg_cost,
            remaining_quantity,
        }
    }

    pub fn is_flat(&self) -> bool {
        !self.remaining_quantity.is_positive()
    }
}

/// Working holdings keyed by instrument. Ordered for deterministic iteration.
pub type Holdings = BTreeMap<InstrumentId, HoldingState>;

/// Persisted resumption checkpoint for one (user, exchange) pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HoldingsSnapshot {
    pub positions: Holdings,
    /// Execution time of the last trade folded into `positions`.
    pub last_applied_ms: Option<TimeMs>,
}

impl HoldingsSnapshot {
    pub fn new(positions: Holdings, last_applied_ms: Option<TimeMs>) -> Self {
        Self {
            positions,
            last_applied_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// A persisted holding row, labelled with the instrument symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub instrument_id: InstrumentId,
    pub symbol: String,
    #[serde(flatten)]
    pub state: HoldingState,
}
