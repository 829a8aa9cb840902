use crate::types::{ClientId, TierId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operator-issued manual overrides.
/// Variants may be added but never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    SetTier {
        tier: TierId,
    },
    AdjustProtectionPoints {
        delta: i64,
    },
    AdjustProtectionMonths {
        delta: i64,
    },
    ApplyCashback {
        amount:    f64,
        reference: String,
    },
}

impl AdminCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetTier { .. }                => "set_tier",
            Self::AdjustProtectionPoints { .. } => "adjust_protection_points",
            Self::AdjustProtectionMonths { .. } => "adjust_protection_months",
            Self::ApplyCashback { .. }          => "apply_cashback",
        }
    }
}

/// One audit row per override, kept apart from evaluation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideAuditEntry {
    pub audit_id:   String,
    pub client_id:  ClientId,
    pub command:    AdminCommand,
    pub reason:     String,
    pub actor:      String,
    pub clamped:    bool,
    pub created_at: DateTime<Utc>,
}

/// Parse an operator-supplied delta. Non-numeric input is treated as a
/// zero adjustment and logged; it never aborts the override.
pub fn parse_delta(raw: &str) -> i64 {
    match raw.trim().parse::<i64>() {
        Ok(delta) => delta,
        Err(_) => {
            log::warn!("override: non-numeric delta {raw:?} clamped to 0");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_delta_clamps_garbage_to_zero() {
        assert_eq!(parse_delta("3"), 3);
        assert_eq!(parse_delta(" -2 "), -2);
        assert_eq!(parse_delta("two"), 0);
        assert_eq!(parse_delta(""), 0);
    }

    #[test]
    fn commands_serialize_with_tag() {
        let cmd = AdminCommand::SetTier { tier: TierId::Elite };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"cmd":"set_tier","tier":"elite"}"#);
    }
}
