//! The loyalty event log.
//!
//! RULE: every state change the engine commits is recorded as an event in
//! the same transaction as the change itself.

use crate::types::{ClientId, TierId, Units, YearMonth};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Every event emitted by the engine.
/// Variants may be added but never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoyaltyEvent {
    // ── Enrollment ─────────────────────────────────
    ClientRegistered {
        client_id: ClientId,
    },
    ClientEnrolled {
        client_id: ClientId,
        tier:      TierId,
        date:      NaiveDate,
    },

    // ── Monthly evaluation ─────────────────────────
    EvaluationSkipped {
        client_id:     ClientId,
        month:         YearMonth,
        pending_count: usize,
    },
    TierEvaluated {
        client_id:          ClientId,
        month:              YearMonth,
        units:              Units,
        from_tier:          TierId,
        calculated_tier:    TierId,
        final_tier:         TierId,
        protection_used:    bool,
        protection_awarded: bool,
    },
    PromotionConverted {
        client_id:    ClientId,
        month:        YearMonth,
        elite_points: u64,
    },
    CashbackAwarded {
        client_id: ClientId,
        from_tier: TierId,
        to_tier:   TierId,
        amount:    f64,
    },

    // ── Month rollover ─────────────────────────────
    CountersReset {
        clients: usize,
        at:      DateTime<Utc>,
    },

    // ── Manual overrides ───────────────────────────
    OverrideApplied {
        client_id: ClientId,
        kind:      String,
        clamped:   bool,
    },
}

impl LoyaltyEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ClientRegistered { .. }   => "client_registered",
            Self::ClientEnrolled { .. }     => "client_enrolled",
            Self::EvaluationSkipped { .. }  => "evaluation_skipped",
            Self::TierEvaluated { .. }      => "tier_evaluated",
            Self::PromotionConverted { .. } => "promotion_converted",
            Self::CashbackAwarded { .. }    => "cashback_awarded",
            Self::CountersReset { .. }      => "counters_reset",
            Self::OverrideApplied { .. }    => "override_applied",
        }
    }

    pub fn client_id(&self) -> Option<&str> {
        match self {
            Self::ClientRegistered { client_id }
            | Self::ClientEnrolled { client_id, .. }
            | Self::EvaluationSkipped { client_id, .. }
            | Self::TierEvaluated { client_id, .. }
            | Self::PromotionConverted { client_id, .. }
            | Self::CashbackAwarded { client_id, .. }
            | Self::OverrideApplied { client_id, .. } => Some(client_id.as_str()),
            Self::CountersReset { .. } => None,
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub client_id:  Option<ClientId>,
    pub event_type: String,
    pub payload:    String, // JSON-serialized LoyaltyEvent
    pub created_at: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn from_event(event: &LoyaltyEvent, at: DateTime<Utc>) -> serde_json::Result<Self> {
        Ok(Self {
            id:         None,
            client_id:  event.client_id().map(str::to_string),
            event_type: event.type_name().to_string(),
            payload:    serde_json::to_string(event)?,
            created_at: at,
        })
    }

    pub fn decode(&self) -> serde_json::Result<LoyaltyEvent> {
        serde_json::from_str(&self.payload)
    }
}
