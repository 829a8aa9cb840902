//! Billable-unit source. Estimators submit unit records during the month;
//! a record only counts as final once it carries a finalized quantity.

use crate::{
    error::{LoyaltyError, LoyaltyResult},
    types::{ClientId, Units, YearMonth},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub record_id: String,
    pub client_id: ClientId,
    pub month:     YearMonth,
    pub quantity:  Option<Units>,
    pub finalized: bool,
}

impl UnitRecord {
    pub fn is_final(&self) -> bool {
        self.finalized && self.quantity.is_some()
    }
}

/// Where the evaluator reads a month's unit records and the live
/// counter it snapshots for classification.
pub trait UnitSource {
    fn month_records(&self, client_id: &str, month: YearMonth) -> LoyaltyResult<Vec<UnitRecord>>;

    fn current_month_units(&self, client_id: &str) -> LoyaltyResult<Units>;
}

/// A quantity as stored in SQLite. Anything above `i64::MAX` is rejected.
pub fn checked_quantity(quantity: Units) -> LoyaltyResult<i64> {
    i64::try_from(quantity).map_err(|_| LoyaltyError::QuantityOutOfRange { quantity })
}

/// Outcome of the readiness gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Pending { unfinalized: usize },
}

pub fn check_readiness(records: &[UnitRecord]) -> Readiness {
    let unfinalized = records.iter().filter(|r| !r.is_final()).count();
    if unfinalized == 0 {
        Readiness::Ready
    } else {
        Readiness::Pending { unfinalized }
    }
}
