//! Shared primitive types used across the loyalty engine.
//!
//! RULE: tier names and months travel as these types internally.
//! Raw strings are parsed exactly once, at the store or operator boundary.

use crate::error::ParseError;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stable, unique identifier for a client account.
pub type ClientId = String;

/// Billable units. All tier and protection math is expressed in units.
pub type Units = u64;

/// Pricing tier, totally ordered Casual < Pro < Elite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TierId {
    Casual,
    Pro,
    Elite,
}

impl TierId {
    pub const ALL: [TierId; 3] = [TierId::Casual, TierId::Pro, TierId::Elite];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierId::Casual => "casual",
            TierId::Pro    => "pro",
            TierId::Elite  => "elite",
        }
    }

    /// Position in the tier order, starting at 0 for Casual.
    pub fn order(&self) -> usize {
        match self {
            TierId::Casual => 0,
            TierId::Pro    => 1,
            TierId::Elite  => 2,
        }
    }

    pub fn is_upgrade_to(&self, to: TierId) -> bool {
        to.order() > self.order()
    }

    pub fn is_downgrade_to(&self, to: TierId) -> bool {
        to.order() < self.order()
    }

    /// The next tier up, if any.
    pub fn next(&self) -> Option<TierId> {
        match self {
            TierId::Casual => Some(TierId::Pro),
            TierId::Pro    => Some(TierId::Elite),
            TierId::Elite  => None,
        }
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TierId::Casual => "Casual",
            TierId::Pro    => "Pro",
            TierId::Elite  => "Elite",
        };
        f.write_str(label)
    }
}

/// Accepts every casing seen from upstream systems ("PRO", "Pro", "pro"),
/// surrounding whitespace, and a trailing "tier" suffix ("elite_tier").
impl FromStr for TierId {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let name = normalized
            .strip_suffix("_tier")
            .unwrap_or(&normalized);
        match name {
            "casual" => Ok(TierId::Casual),
            "pro"    => Ok(TierId::Pro),
            "elite"  => Ok(TierId::Elite),
            _        => Err(ParseError::UnknownTier(raw.to_string())),
        }
    }
}

/// A calendar month, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year:  i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, ParseError> {
        if !(1..=12).contains(&month) {
            return Err(ParseError::InvalidMonth(format!("{year}-{month}")));
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`.
    pub fn of<D: Datelike>(date: &D) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    pub fn year(&self) -> i32 { self.year }
    pub fn month(&self) -> u32 { self.month }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidMonth(raw.to_string());
        let (y, m) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for YearMonth {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_names_normalize_across_casings() {
        for raw in ["pro", "PRO", "Pro", " pro ", "pro_tier", "Pro Tier"] {
            assert_eq!(raw.parse::<TierId>().unwrap(), TierId::Pro, "failed on {raw:?}");
        }
        assert_eq!("ELITE".parse::<TierId>().unwrap(), TierId::Elite);
        assert_eq!("casual".parse::<TierId>().unwrap(), TierId::Casual);
        assert!("platinum".parse::<TierId>().is_err());
    }

    #[test]
    fn tier_order_is_casual_pro_elite() {
        assert!(TierId::Casual < TierId::Pro);
        assert!(TierId::Pro < TierId::Elite);
        assert!(TierId::Casual.is_upgrade_to(TierId::Elite));
        assert!(TierId::Elite.is_downgrade_to(TierId::Pro));
        assert!(!TierId::Pro.is_upgrade_to(TierId::Pro));
    }

    #[test]
    fn year_month_wraps_across_years() {
        let jan = YearMonth::new(2026, 1).unwrap();
        assert_eq!(jan.previous().to_string(), "2025-12");
        assert_eq!(jan.previous().next(), jan);
        assert_eq!("2026-09".parse::<YearMonth>().unwrap(), YearMonth::new(2026, 9).unwrap());
        assert!("2026-13".parse::<YearMonth>().is_err());
        assert!("september".parse::<YearMonth>().is_err());
    }
}
