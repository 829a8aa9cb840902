//! Protection ledger: points earned above a tier minimum bank into
//! protection months that can later shield one downgrade each.
//!
//! Invariants held by every method:
//!   - months never exceed the configured cap
//!   - points are never discarded while the protection type is unchanged
//!   - months and points always belong to `protection_type`

use crate::{
    tier_table::TierDefinition,
    types::{TierId, Units},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionLedger {
    /// Tier the banked protection applies to. `None` = no protection.
    pub protection_type: Option<TierId>,
    pub months:          u32,
    pub points:          u64,
}

/// Result of one accrual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accrual {
    pub awarded_months:   u32,
    pub remaining_points: u64,
}

/// Points earned for a month at `tier`: every unit strictly above the tier's
/// own minimum. Tiers without a protection threshold earn nothing.
pub fn points_earned(units: Units, tier: &TierDefinition) -> u64 {
    if !tier.earns_protection() {
        return 0;
    }
    units.saturating_sub(tier.min_units)
}

impl ProtectionLedger {
    /// Ledger seeded for a client placed directly on `tier`.
    pub fn for_tier(tier: &TierDefinition) -> Self {
        Self {
            protection_type: tier.earns_protection().then_some(tier.id),
            months: 0,
            points: 0,
        }
    }

    /// Add `points` toward protection for `tier`, converting whole thresholds
    /// into months until the cap is reached. A different incoming tier
    /// replaces the ledger: old months and points are not carried over.
    pub fn accrue(&mut self, tier: &TierDefinition, points: u64, max_months: u32) -> Accrual {
        let Some(required) = tier.protection_points_required else {
            if self.protection_type.is_some() {
                log::debug!(
                    "ledger: clearing {:?} protection ({} months, {} points) on move to {}",
                    self.protection_type, self.months, self.points, tier.id
                );
            }
            *self = Self::default();
            return Accrual { awarded_months: 0, remaining_points: 0 };
        };

        if self.protection_type != Some(tier.id) {
            if self.protection_type.is_some() && (self.months > 0 || self.points > 0) {
                log::debug!(
                    "ledger: switching protection {:?} -> {} drops {} months, {} points",
                    self.protection_type, tier.id, self.months, self.points
                );
            }
            self.protection_type = Some(tier.id);
            self.months = 0;
            self.points = 0;
        }

        self.points = self.points.saturating_add(points);

        let mut awarded = 0;
        while self.points >= required && self.months < max_months {
            self.points -= required;
            self.months += 1;
            awarded += 1;
        }

        Accrual { awarded_months: awarded, remaining_points: self.points }
    }

    /// Spend one banked month to hold `tier`. Only succeeds when the banked
    /// protection is for that exact tier and at least one month is available.
    pub fn spend_one_month(&mut self, tier: TierId) -> bool {
        if self.protection_type != Some(tier) || self.months == 0 {
            return false;
        }
        self.months -= 1;
        true
    }

    /// Points still needed to bank the next month, or `None` when there is
    /// no protection type or the cap is already reached.
    pub fn points_to_next_month(&self, tier: &TierDefinition, max_months: u32) -> Option<u64> {
        let required = tier.protection_points_required?;
        if self.protection_type != Some(tier.id) || self.months >= max_months {
            return None;
        }
        Some(required.saturating_sub(self.points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProgramConfig;

    fn pro() -> TierDefinition {
        ProgramConfig::standard().tiers.get(TierId::Pro).clone()
    }

    fn elite() -> TierDefinition {
        ProgramConfig::standard().tiers.get(TierId::Elite).clone()
    }

    #[test]
    fn points_only_count_units_above_minimum() {
        let tiers = ProgramConfig::standard().tiers;
        assert_eq!(points_earned(12, tiers.get(TierId::Pro)), 7);
        assert_eq!(points_earned(12, tiers.get(TierId::Elite)), 2);
        assert_eq!(points_earned(3, tiers.get(TierId::Elite)), 0);
        for units in [0, 5, 50, 5000] {
            assert_eq!(points_earned(units, tiers.get(TierId::Casual)), 0);
        }
    }

    #[test]
    fn accrue_carries_remainder() {
        let mut ledger = ProtectionLedger::for_tier(&pro());
        let accrual = ledger.accrue(&pro(), 7, 3);
        assert_eq!(accrual, Accrual { awarded_months: 1, remaining_points: 2 });
        assert_eq!(ledger.months, 1);

        let accrual = ledger.accrue(&pro(), 3, 3);
        assert_eq!(accrual.awarded_months, 1);
        assert_eq!(ledger.points, 0);
        assert_eq!(ledger.months, 2);
    }

    #[test]
    fn accrue_caps_months_and_keeps_excess_points() {
        let mut ledger = ProtectionLedger::for_tier(&pro());
        let accrual = ledger.accrue(&pro(), 40, 3);
        assert_eq!(accrual.awarded_months, 3);
        assert_eq!(ledger.months, 3);
        assert_eq!(ledger.points, 25, "points above the cap must be preserved");

        // Spending frees a slot; the waiting points redeem on the next accrual.
        assert!(ledger.spend_one_month(TierId::Pro));
        let accrual = ledger.accrue(&pro(), 0, 3);
        assert_eq!(accrual.awarded_months, 1);
        assert_eq!(ledger.months, 3);
        assert_eq!(ledger.points, 20);
    }

    #[test]
    fn accrue_for_new_type_does_not_transfer_balance() {
        let mut ledger = ProtectionLedger {
            protection_type: Some(TierId::Pro),
            months: 2,
            points: 4,
        };
        ledger.accrue(&elite(), 3, 3);
        assert_eq!(ledger.protection_type, Some(TierId::Elite));
        assert_eq!(ledger.months, 0);
        assert_eq!(ledger.points, 3);
    }

    #[test]
    fn accrue_for_casual_clears_protection() {
        let casual = ProgramConfig::standard().tiers.get(TierId::Casual).clone();
        let mut ledger = ProtectionLedger {
            protection_type: Some(TierId::Pro),
            months: 0,
            points: 4,
        };
        let accrual = ledger.accrue(&casual, 0, 3);
        assert_eq!(accrual.awarded_months, 0);
        assert_eq!(ledger, ProtectionLedger::default());
    }

    #[test]
    fn spend_requires_matching_type_and_months() {
        let mut ledger = ProtectionLedger {
            protection_type: Some(TierId::Elite),
            months: 1,
            points: 6,
        };
        assert!(!ledger.spend_one_month(TierId::Pro));
        assert_eq!(ledger.months, 1);

        assert!(ledger.spend_one_month(TierId::Elite));
        assert_eq!(ledger.months, 0);
        assert_eq!(ledger.points, 6);

        assert!(!ledger.spend_one_month(TierId::Elite));
        assert_eq!(ledger.months, 0);
    }

    #[test]
    fn points_to_next_month_reports_gap() {
        let ledger = ProtectionLedger {
            protection_type: Some(TierId::Pro),
            months: 1,
            points: 3,
        };
        assert_eq!(ledger.points_to_next_month(&pro(), 3), Some(2));
        assert_eq!(ledger.points_to_next_month(&elite(), 3), None);
    }
}
