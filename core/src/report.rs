//! Read-only views handed to callers: a client's loyalty status and a
//! price quote for a unit volume.

use crate::{
    config::ProgramConfig,
    state::ClientLoyaltyState,
    types::{ClientId, TierId, Units, YearMonth},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub client_id:              ClientId,
    pub enrolled_date:          Option<NaiveDate>,
    pub tier:                   TierId,
    pub previous_tier:          Option<TierId>,
    pub tier_effective_date:    Option<DateTime<Utc>>,
    pub price_per_unit:         f64,
    pub discount_pct:           f64,
    pub protection_type:        Option<TierId>,
    pub protection_months:      u32,
    pub protection_points:      u64,
    /// `None` when there is no protection type or the cap is reached.
    pub points_to_next_month:   Option<u64>,
    pub current_month_units:    Units,
    /// Tier the in-progress counter would classify to today.
    pub projected_tier:         TierId,
    pub units_to_next_tier:     Option<Units>,
    pub cashback_balance:       f64,
    pub lifetime_units_billed:  Units,
    pub meets_lifetime_minimum: bool,
    pub last_evaluated_month:   Option<YearMonth>,
}

impl ClientStatus {
    pub fn from_state(state: &ClientLoyaltyState, config: &ProgramConfig) -> Self {
        let tiers = &config.tiers;
        let def = tiers.get(state.current_tier);
        let points_to_next_month = state
            .ledger
            .protection_type
            .and_then(|t| state.ledger.points_to_next_month(tiers.get(t), config.max_protection_months));

        Self {
            client_id:              state.client_id.clone(),
            enrolled_date:          state.enrolled_date,
            tier:                   state.current_tier,
            previous_tier:          state.previous_tier,
            tier_effective_date:    state.tier_effective_date,
            price_per_unit:         def.price_per_unit,
            discount_pct:           def.discount_pct,
            protection_type:        state.ledger.protection_type,
            protection_months:      state.ledger.months,
            protection_points:      state.ledger.points,
            points_to_next_month,
            current_month_units:    state.current_month_units,
            projected_tier:         tiers.classify(state.current_month_units),
            units_to_next_tier:     tiers.units_to_next_tier(state.current_tier, state.current_month_units),
            cashback_balance:       state.cashback_balance,
            lifetime_units_billed:  state.lifetime_units_billed,
            meets_lifetime_minimum: state.meets_lifetime_minimum,
            last_evaluated_month:   state.last_evaluated_month,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub units:          Units,
    pub tier:           TierId,
    pub price_per_unit: f64,
    pub discount_pct:   f64,
    pub total:          f64,
}

impl PriceQuote {
    pub fn for_units(config: &ProgramConfig, units: Units) -> Self {
        let tier = config.tiers.classify(units);
        let def = config.tiers.get(tier);
        Self {
            units,
            tier,
            price_per_unit: def.price_per_unit,
            discount_pct:   def.discount_pct,
            total:          (units as f64 * def.price_per_unit * 100.0).round() / 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_prices_at_classified_tier() {
        let config = ProgramConfig::standard();
        let q = PriceQuote::for_units(&config, 12);
        assert_eq!(q.tier, TierId::Elite);
        assert_eq!(q.price_per_unit, 24.0);
        assert_eq!(q.total, 288.0);

        let q = PriceQuote::for_units(&config, 0);
        assert_eq!(q.tier, TierId::Casual);
        assert_eq!(q.total, 0.0);
    }

    #[test]
    fn status_reports_progress_toward_next_month() {
        let config = ProgramConfig::standard();
        let mut state = ClientLoyaltyState::new("acme");
        state.current_tier = TierId::Pro;
        state.ledger.protection_type = Some(TierId::Pro);
        state.ledger.points = 3;
        state.current_month_units = 7;

        let status = ClientStatus::from_state(&state, &config);
        assert_eq!(status.price_per_unit, 27.0);
        assert_eq!(status.points_to_next_month, Some(2));
        assert_eq!(status.projected_tier, TierId::Pro);
        assert_eq!(status.units_to_next_tier, Some(3));
    }
}
