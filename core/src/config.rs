use crate::{
    tier_table::{TierDefinition, TierTable},
    types::{TierId, Units},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Upper bound on banked protection months.
pub const MAX_PROTECTION_MONTHS: u32 = 3;

/// Immutable program configuration. Built once and handed to every
/// component at construction; nothing reads tier constants from globals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgramConfig {
    pub tiers: TierTable,
    /// Fixed credit granted per qualifying upgrade.
    pub cashback_amount: f64,
    /// Lifetime billed units a client needs before cashback can fire.
    pub lifetime_minimum_units: Units,
    #[serde(default = "default_max_protection_months")]
    pub max_protection_months: u32,
    pub rollout: RolloutConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolloutConfig {
    pub tier: TierId,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    /// Worker threads for the monthly batch. 1 = sequential.
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

fn default_max_protection_months() -> u32 {
    MAX_PROTECTION_MONTHS
}

impl ProgramConfig {
    /// Load from `{data_dir}/loyalty/program_config.json`.
    /// In tests, use ProgramConfig::standard().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/loyalty/program_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: ProgramConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        log::info!(
            "config: loaded {path} (cashback ${:.2}, lifetime minimum {} units)",
            config.cashback_amount, config.lifetime_minimum_units
        );
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cashback_amount < 0.0 {
            anyhow::bail!("cashback_amount must not be negative");
        }
        if self.max_protection_months == 0 || self.max_protection_months > MAX_PROTECTION_MONTHS {
            anyhow::bail!(
                "max_protection_months must be between 1 and {MAX_PROTECTION_MONTHS}"
            );
        }
        if self.batch.workers == 0 {
            anyhow::bail!("batch.workers must be at least 1");
        }
        Ok(())
    }

    /// The compiled-in program.
    pub fn standard() -> Self {
        let tiers = vec![
            TierDefinition {
                id:             TierId::Casual,
                min_units:      0,
                max_units:      Some(4),
                price_per_unit: 30.0,
                discount_pct:   0.0,
                protection_points_required: None,
            },
            TierDefinition {
                id:             TierId::Pro,
                min_units:      5,
                max_units:      Some(9),
                price_per_unit: 27.0,
                discount_pct:   10.0,
                protection_points_required: Some(5),
            },
            TierDefinition {
                id:             TierId::Elite,
                min_units:      10,
                max_units:      None,
                price_per_unit: 24.0,
                discount_pct:   20.0,
                protection_points_required: Some(10),
            },
        ];

        Self {
            // The standard table satisfies every TierTable rule.
            tiers: match TierTable::new(tiers) {
                Ok(t) => t,
                Err(e) => unreachable!("standard tier table is invalid: {e}"),
            },
            cashback_amount: 100.0,
            lifetime_minimum_units: 50,
            max_protection_months: MAX_PROTECTION_MONTHS,
            rollout: RolloutConfig {
                tier: TierId::Pro,
                date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap_or_default(),
            },
            batch: BatchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_round_trips_through_json() {
        let config = ProgramConfig::standard();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ProgramConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn json_with_duplicate_tier_is_rejected() {
        let json = r#"{
            "tiers": [
                {"id": "casual", "min_units": 0, "max_units": 4, "price_per_unit": 30.0, "discount_pct": 0.0},
                {"id": "pro", "min_units": 5, "max_units": 9, "price_per_unit": 27.0, "discount_pct": 10.0, "protection_points_required": 5},
                {"id": "pro", "min_units": 10, "max_units": null, "price_per_unit": 24.0, "discount_pct": 20.0, "protection_points_required": 10}
            ],
            "cashback_amount": 100.0,
            "lifetime_minimum_units": 50,
            "rollout": {"tier": "pro", "date": "2025-06-01"}
        }"#;
        assert!(serde_json::from_str::<ProgramConfig>(json).is_err());
    }

    #[test]
    fn zero_workers_fails_validation() {
        let mut config = ProgramConfig::standard();
        config.batch.workers = 0;
        assert!(config.validate().is_err());
    }
}
