//! Persisted per-client loyalty state and its append-only history records.

use crate::{
    protection_ledger::ProtectionLedger,
    types::{ClientId, TierId, Units, YearMonth},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientLoyaltyState {
    pub client_id:              ClientId,
    pub current_tier:           TierId,
    pub previous_tier:          Option<TierId>,
    pub tier_effective_date:    Option<DateTime<Utc>>,
    pub ledger:                 ProtectionLedger,
    pub cashback_balance:       f64,
    /// Every cashback ever granted. Small and bounded by the number of
    /// upgrade pairs, so it is always loaded with the state.
    pub cashback_awards:        Vec<CashbackAward>,
    pub current_month_units:    Units,
    pub lifetime_units_billed:  Units,
    pub meets_lifetime_minimum: bool,
    /// `None` excludes the client from evaluation and counter resets.
    pub enrolled_date:          Option<NaiveDate>,
    pub counter_reset_at:       Option<DateTime<Utc>>,
    pub last_evaluated_month:   Option<YearMonth>,
}

impl ClientLoyaltyState {
    /// All-zero state for a newly registered client.
    pub fn new(client_id: impl Into<ClientId>) -> Self {
        Self {
            client_id:              client_id.into(),
            current_tier:           TierId::Casual,
            previous_tier:          None,
            tier_effective_date:    None,
            ledger:                 ProtectionLedger::default(),
            cashback_balance:       0.0,
            cashback_awards:        Vec::new(),
            current_month_units:    0,
            lifetime_units_billed:  0,
            meets_lifetime_minimum: false,
            enrolled_date:          None,
            counter_reset_at:       None,
            last_evaluated_month:   None,
        }
    }

    pub fn is_enrolled(&self) -> bool {
        self.enrolled_date.is_some()
    }

    pub fn has_award_for(&self, from: TierId, to: TierId) -> bool {
        self.cashback_awards
            .iter()
            .any(|a| a.from_tier == from && a.to_tier == to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashbackAward {
    pub award_id:   String,
    pub from_tier:  TierId,
    pub to_tier:    TierId,
    pub awarded_at: DateTime<Utc>,
    pub amount:     f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyHistoryEntry {
    pub month:              YearMonth,
    pub tier:               TierId,
    pub units:              Units,
    pub price_per_unit:     f64,
    pub total_billed:       f64,
    pub protection_awarded: bool,
    pub protection_used:    bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionHistoryEntry {
    pub month:                YearMonth,
    pub tier:                 TierId,
    pub units_submitted:      Units,
    pub tier_minimum:         Units,
    pub points_earned:        u64,
    pub points_balance_after: u64,
    pub protection_awarded:   bool,
    pub protection_used:      bool,
}
