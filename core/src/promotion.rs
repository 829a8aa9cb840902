//! Pro → Elite promotion conversion.

use crate::{
    protection_ledger::ProtectionLedger,
    tier_table::TierTable,
    types::TierId,
};

/// Converts banked Pro protection into Elite points on promotion.
/// Each banked Pro month is worth exactly the Pro threshold in points,
/// so nothing the client earned is lost by the move.
#[derive(Debug, Clone, Copy)]
pub struct PromotionConverter {
    factor: u64,
}

impl PromotionConverter {
    pub fn from_table(tiers: &TierTable) -> Self {
        Self {
            factor: tiers
                .get(TierId::Pro)
                .protection_points_required
                .unwrap_or_default(),
        }
    }

    pub fn factor(&self) -> u64 {
        self.factor
    }

    /// Rewrite a Pro ledger as Elite points. The result is left as a raw
    /// balance; it is only reduced against the Elite threshold by the next
    /// accrual. Returns the new point balance, or `None` if the ledger
    /// did not hold Pro protection.
    pub fn convert(&self, ledger: &mut ProtectionLedger) -> Option<u64> {
        if ledger.protection_type != Some(TierId::Pro) {
            log::warn!(
                "promotion: expected Pro protection, found {:?}; conversion skipped",
                ledger.protection_type
            );
            return None;
        }

        let elite_points = u64::from(ledger.months)
            .saturating_mul(self.factor)
            .saturating_add(ledger.points);

        log::debug!(
            "promotion: {} Pro months + {} points -> {} Elite points",
            ledger.months, ledger.points, elite_points
        );

        ledger.protection_type = Some(TierId::Elite);
        ledger.months = 0;
        ledger.points = elite_points;
        Some(elite_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProgramConfig;

    #[test]
    fn banked_pro_months_become_elite_points() {
        let converter = PromotionConverter::from_table(&ProgramConfig::standard().tiers);
        assert_eq!(converter.factor(), 5);

        let mut ledger = ProtectionLedger {
            protection_type: Some(TierId::Pro),
            months: 2,
            points: 3,
        };
        assert_eq!(converter.convert(&mut ledger), Some(13));
        assert_eq!(ledger.protection_type, Some(TierId::Elite));
        assert_eq!(ledger.months, 0);
        assert_eq!(ledger.points, 13);
    }

    #[test]
    fn factor_follows_the_tier_table() {
        let mut config = ProgramConfig::standard();
        let mut defs: Vec<_> = config.tiers.clone().into();
        defs[1].protection_points_required = Some(8);
        config.tiers = TierTable::new(defs).unwrap();

        let converter = PromotionConverter::from_table(&config.tiers);
        let mut ledger = ProtectionLedger {
            protection_type: Some(TierId::Pro),
            months: 1,
            points: 1,
        };
        assert_eq!(converter.convert(&mut ledger), Some(9));
    }

    #[test]
    fn non_pro_ledger_is_left_alone() {
        let converter = PromotionConverter::from_table(&ProgramConfig::standard().tiers);
        let mut ledger = ProtectionLedger {
            protection_type: Some(TierId::Elite),
            months: 1,
            points: 4,
        };
        let before = ledger.clone();
        assert_eq!(converter.convert(&mut ledger), None);
        assert_eq!(ledger, before);
    }
}
