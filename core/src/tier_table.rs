//! Tier table and classifier.
//!
//! The table is immutable once built. It is validated on construction so
//! every lookup afterwards is infallible.

use crate::{
    error::{LoyaltyError, LoyaltyResult},
    types::{TierId, Units},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierDefinition {
    pub id:             TierId,
    pub min_units:      Units,
    /// Inclusive upper bound; `None` means unbounded.
    pub max_units:      Option<Units>,
    pub price_per_unit: f64,
    pub discount_pct:   f64,
    /// Points needed to bank one protection month. Absent for Casual.
    #[serde(default)]
    pub protection_points_required: Option<u64>,
}

impl TierDefinition {
    pub fn earns_protection(&self) -> bool {
        self.protection_points_required.is_some()
    }
}

/// One definition per tier, indexed by `TierId::order()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<TierDefinition>", into = "Vec<TierDefinition>")]
pub struct TierTable {
    tiers: [TierDefinition; 3],
}

impl TierTable {
    pub fn new(definitions: Vec<TierDefinition>) -> LoyaltyResult<Self> {
        let mut slots: [Option<TierDefinition>; 3] = [None, None, None];
        for def in definitions {
            let slot = &mut slots[def.id.order()];
            if slot.is_some() {
                return Err(LoyaltyError::InvalidTierTable(format!(
                    "tier {} defined more than once", def.id
                )));
            }
            *slot = Some(def);
        }

        let [casual, pro, elite] = slots;
        let missing = |id: TierId| {
            LoyaltyError::InvalidTierTable(format!("tier {id} is not defined"))
        };
        let tiers = [
            casual.ok_or_else(|| missing(TierId::Casual))?,
            pro.ok_or_else(|| missing(TierId::Pro))?,
            elite.ok_or_else(|| missing(TierId::Elite))?,
        ];

        if tiers[0].earns_protection() {
            return Err(LoyaltyError::InvalidTierTable(
                "Casual cannot earn protection points".into(),
            ));
        }
        for def in &tiers[1..] {
            match def.protection_points_required {
                Some(0) | None => {
                    return Err(LoyaltyError::InvalidTierTable(format!(
                        "tier {} needs a positive protection_points_required", def.id
                    )));
                }
                Some(_) => {}
            }
        }
        for pair in tiers.windows(2) {
            if pair[1].min_units < pair[0].min_units {
                return Err(LoyaltyError::InvalidTierTable(format!(
                    "{} minimum ({}) is below {} minimum ({})",
                    pair[1].id, pair[1].min_units, pair[0].id, pair[0].min_units
                )));
            }
        }

        Ok(Self { tiers })
    }

    pub fn get(&self, id: TierId) -> &TierDefinition {
        &self.tiers[id.order()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &TierDefinition> {
        self.tiers.iter()
    }

    /// Highest tier whose minimum is met. Overlapping or abutting ranges
    /// resolve to the higher tier because the scan runs top-down.
    pub fn classify(&self, units: Units) -> TierId {
        self.tiers
            .iter()
            .rev()
            .find(|def| units >= def.min_units)
            .map(|def| def.id)
            .unwrap_or(TierId::Casual)
    }

    /// Units still needed this month to classify into the next tier up.
    pub fn units_to_next_tier(&self, tier: TierId, units: Units) -> Option<Units> {
        let next = tier.next()?;
        Some(self.get(next).min_units.saturating_sub(units))
    }
}

impl TryFrom<Vec<TierDefinition>> for TierTable {
    type Error = LoyaltyError;

    fn try_from(value: Vec<TierDefinition>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TierTable> for Vec<TierDefinition> {
    fn from(value: TierTable) -> Self {
        value.tiers.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProgramConfig;

    #[test]
    fn classify_picks_highest_tier_met() {
        let table = ProgramConfig::standard().tiers;
        assert_eq!(table.classify(0), TierId::Casual);
        assert_eq!(table.classify(4), TierId::Casual);
        assert_eq!(table.classify(5), TierId::Pro);
        assert_eq!(table.classify(9), TierId::Pro);
        assert_eq!(table.classify(10), TierId::Elite);
        assert_eq!(table.classify(u64::MAX), TierId::Elite);
    }

    #[test]
    fn classify_is_monotonic() {
        let table = ProgramConfig::standard().tiers;
        let mut last = TierId::Casual;
        for units in 0..200 {
            let tier = table.classify(units);
            assert!(tier >= last, "classify({units}) = {tier} dropped below {last}");
            last = tier;
        }
    }

    #[test]
    fn overlapping_boundaries_prefer_higher_tier() {
        let mut defs: Vec<TierDefinition> = ProgramConfig::standard().tiers.into();
        // Pro and Elite both start at 8.
        defs[1].min_units = 8;
        defs[1].max_units = Some(12);
        defs[2].min_units = 8;
        let table = TierTable::new(defs).unwrap();
        assert_eq!(table.classify(8), TierId::Elite);
        assert_eq!(table.classify(7), TierId::Casual);
    }

    #[test]
    fn rejects_table_missing_a_tier() {
        let mut defs: Vec<TierDefinition> = ProgramConfig::standard().tiers.into();
        defs.pop();
        assert!(TierTable::new(defs).is_err());
    }

    #[test]
    fn rejects_casual_with_protection_threshold() {
        let mut defs: Vec<TierDefinition> = ProgramConfig::standard().tiers.into();
        defs[0].protection_points_required = Some(3);
        assert!(TierTable::new(defs).is_err());
    }
}
