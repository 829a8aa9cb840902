//! Monthly evaluator: one client's end-of-month pass.
//!
//! STATE MACHINE (per client, per cycle):
//!   Pending → Gated            (returned as EvaluationOutcome::Skipped)
//!   Pending → Evaluating → Classified → Protected | Downgraded → Archived → Done
//!
//! STEP ORDER (fixed):
//!   1. Readiness gate over the month's unit records
//!   2. Snapshot units and current tier
//!   3. Classify
//!   4. Protect or downgrade
//!   5. Promotion conversion (Pro → Elite only), then point accrual
//!   6. Commit tier change and cashback
//!   7. Archive history
//!   8. Lifetime counters
//!
//! RULES:
//!   - `evaluate` mutates only the in-memory state it is handed.
//!   - `run_for_client` wraps load, evaluate and every write in one
//!     IMMEDIATE transaction; any error rolls the whole client back.
//!   - A committed evaluation stamps an (client, month) marker; a second
//!     run for the same month is reported, never applied.

use crate::{
    cashback::CashbackAwarder,
    config::ProgramConfig,
    error::{LoyaltyError, LoyaltyResult},
    event::LoyaltyEvent,
    promotion::PromotionConverter,
    protection_ledger::points_earned,
    state::{CashbackAward, ClientLoyaltyState, MonthlyHistoryEntry, ProtectionHistoryEntry},
    store::LoyaltyStore,
    types::{ClientId, TierId, Units, YearMonth},
    units::{check_readiness, Readiness, UnitRecord, UnitSource},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationState {
    Pending,
    Evaluating,
    Classified,
    Protected,
    Downgraded,
    Archived,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub client_id:            ClientId,
    pub month:                YearMonth,
    pub units:                Units,
    pub from_tier:            TierId,
    pub calculated_tier:      TierId,
    pub final_tier:           TierId,
    pub protection_used:      bool,
    pub months_awarded:       u32,
    pub points_earned:        u64,
    pub points_balance_after: u64,
    pub promotion_points:     Option<u64>,
    pub cashback:             Option<CashbackAward>,
    pub reached_lifetime_minimum: bool,
    pub monthly:              MonthlyHistoryEntry,
    pub protection:           ProtectionHistoryEntry,
    pub path:                 Vec<EvaluationState>,
}

impl EvaluationSummary {
    pub fn protection_awarded(&self) -> bool {
        self.months_awarded > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// Not an error: unit records for the month are still being finalized.
    Skipped {
        client_id:     ClientId,
        month:         YearMonth,
        reason:        String,
        pending_count: usize,
    },
    /// The month already carries a committed evaluation for this client.
    AlreadyEvaluated {
        client_id: ClientId,
        month:     YearMonth,
    },
    Evaluated(Box<EvaluationSummary>),
}

pub struct MonthlyEvaluator {
    config:    ProgramConfig,
    converter: PromotionConverter,
    cashback:  CashbackAwarder,
}

impl MonthlyEvaluator {
    pub fn new(config: &ProgramConfig) -> Self {
        Self {
            converter: PromotionConverter::from_table(&config.tiers),
            cashback:  CashbackAwarder::new(config.cashback_amount),
            config:    config.clone(),
        }
    }

    /// The month an evaluation triggered at `now` closes: the one before.
    pub fn month_under_review(now: DateTime<Utc>) -> YearMonth {
        YearMonth::of(&now).previous()
    }

    /// Run every step against `state`, classifying on `units`, the live
    /// counter read from the unit source. Mutates nothing when gated.
    pub fn evaluate(
        &self,
        state: &mut ClientLoyaltyState,
        records: &[UnitRecord],
        units: Units,
        month: YearMonth,
        now: DateTime<Utc>,
    ) -> EvaluationOutcome {
        let mut path = vec![EvaluationState::Pending];

        // 1. Readiness gate
        if let Readiness::Pending { unfinalized } = check_readiness(records) {
            log::info!(
                "month={month} evaluator: {} skipped, {unfinalized} unit record(s) not finalized",
                state.client_id
            );
            return EvaluationOutcome::Skipped {
                client_id:     state.client_id.clone(),
                month,
                reason:        "unit records not finalized".to_string(),
                pending_count: unfinalized,
            };
        }
        path.push(EvaluationState::Evaluating);

        let tiers = &self.config.tiers;
        let max_months = self.config.max_protection_months;

        // 2. Snapshot
        let from_tier = state.current_tier;

        // 3. Classify
        let calculated_tier = tiers.classify(units);
        path.push(EvaluationState::Classified);

        // 4. Protect or downgrade
        let (final_tier, protection_used) = if from_tier.is_downgrade_to(calculated_tier) {
            if state.ledger.spend_one_month(from_tier) {
                path.push(EvaluationState::Protected);
                log::info!(
                    "month={month} evaluator: {} held at {from_tier} by protection ({} month(s) left)",
                    state.client_id, state.ledger.months
                );
                (from_tier, true)
            } else {
                path.push(EvaluationState::Downgraded);
                log::info!(
                    "month={month} evaluator: {} downgraded {from_tier} -> {calculated_tier}",
                    state.client_id
                );
                (calculated_tier, false)
            }
        } else {
            (calculated_tier, false)
        };

        // 5. Points are earned against the tier held going into the month.
        // A Pro → Elite move converts banked Pro protection first so the
        // accrual lands on an Elite ledger.
        let earned = points_earned(units, tiers.get(from_tier));
        let promotion_points = if from_tier == TierId::Pro && final_tier == TierId::Elite {
            self.converter.convert(&mut state.ledger)
        } else {
            None
        };
        let accrual = state.ledger.accrue(tiers.get(final_tier), earned, max_months);

        // 6. Commit tier change
        let mut cashback = None;
        if final_tier != from_tier {
            state.previous_tier = Some(from_tier);
            state.current_tier = final_tier;
            state.tier_effective_date = Some(now);
            cashback = self.cashback.maybe_award(state, from_tier, final_tier, now);
        }

        // 7. Archive
        let final_def = tiers.get(final_tier);
        let monthly = MonthlyHistoryEntry {
            month,
            tier:               final_tier,
            units,
            price_per_unit:     final_def.price_per_unit,
            total_billed:       round_cents(units as f64 * final_def.price_per_unit),
            protection_awarded: accrual.awarded_months > 0,
            protection_used,
        };
        let protection = ProtectionHistoryEntry {
            month,
            tier:                 from_tier,
            units_submitted:      units,
            tier_minimum:         tiers.get(from_tier).min_units,
            points_earned:        earned,
            points_balance_after: accrual.remaining_points,
            protection_awarded:   accrual.awarded_months > 0,
            protection_used,
        };
        path.push(EvaluationState::Archived);

        // 8. Lifetime counters
        let mut reached_lifetime_minimum = false;
        if units > 0 {
            state.lifetime_units_billed = state.lifetime_units_billed.saturating_add(units);
            if !state.meets_lifetime_minimum
                && state.lifetime_units_billed >= self.config.lifetime_minimum_units
            {
                state.meets_lifetime_minimum = true;
                reached_lifetime_minimum = true;
            }
        }
        state.last_evaluated_month = Some(month);
        path.push(EvaluationState::Done);

        log::info!(
            "month={month} evaluator: {} units={units} {from_tier} -> {final_tier} \
             (calculated {calculated_tier}, earned {earned} pts, awarded {} month(s))",
            state.client_id, accrual.awarded_months
        );

        EvaluationOutcome::Evaluated(Box::new(EvaluationSummary {
            client_id: state.client_id.clone(),
            month,
            units,
            from_tier,
            calculated_tier,
            final_tier,
            protection_used,
            months_awarded: accrual.awarded_months,
            points_earned: earned,
            points_balance_after: accrual.remaining_points,
            promotion_points,
            cashback,
            reached_lifetime_minimum,
            monthly,
            protection,
            path,
        }))
    }

    /// Load, evaluate and persist one client as a single transaction.
    pub fn run_for_client(
        &self,
        store: &LoyaltyStore,
        units: &dyn UnitSource,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<EvaluationOutcome> {
        let month = Self::month_under_review(now);

        store.immediate(|| {
            let mut state = store.require_client(client_id)?;
            if !state.is_enrolled() {
                return Err(LoyaltyError::NotEnrolled { client_id: client_id.to_string() });
            }

            if store.evaluation_marker_exists(client_id, month)? {
                log::warn!("month={month} evaluator: {client_id} already evaluated, not re-applied");
                return Ok(EvaluationOutcome::AlreadyEvaluated {
                    client_id: client_id.to_string(),
                    month,
                });
            }

            let records = units.month_records(client_id, month)?;
            let month_units = units.current_month_units(client_id)?;
            let outcome = self.evaluate(&mut state, &records, month_units, month, now);

            match &outcome {
                EvaluationOutcome::Skipped { pending_count, .. } => {
                    store.record_event(
                        &LoyaltyEvent::EvaluationSkipped {
                            client_id:     client_id.to_string(),
                            month,
                            pending_count: *pending_count,
                        },
                        now,
                    )?;
                }
                EvaluationOutcome::Evaluated(summary) => {
                    self.commit(store, &state, summary, now)?;
                }
                EvaluationOutcome::AlreadyEvaluated { .. } => {}
            }
            Ok(outcome)
        })
    }

    fn commit(
        &self,
        store: &LoyaltyStore,
        state: &ClientLoyaltyState,
        summary: &EvaluationSummary,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<()> {
        let client_id = &state.client_id;
        let month = summary.month;

        store.save_client(state)?;
        if let Some(award) = &summary.cashback {
            store.insert_cashback_award(client_id, award)?;
        }
        store.append_monthly_history(client_id, &summary.monthly)?;
        store.append_protection_history(client_id, &summary.protection)?;
        store.insert_evaluation_marker(client_id, month, summary.final_tier, now)?;

        store.record_event(
            &LoyaltyEvent::TierEvaluated {
                client_id:          client_id.clone(),
                month,
                units:              summary.units,
                from_tier:          summary.from_tier,
                calculated_tier:    summary.calculated_tier,
                final_tier:         summary.final_tier,
                protection_used:    summary.protection_used,
                protection_awarded: summary.protection_awarded(),
            },
            now,
        )?;
        if let Some(elite_points) = summary.promotion_points {
            store.record_event(
                &LoyaltyEvent::PromotionConverted {
                    client_id: client_id.clone(),
                    month,
                    elite_points,
                },
                now,
            )?;
        }
        if let Some(award) = &summary.cashback {
            store.record_event(
                &LoyaltyEvent::CashbackAwarded {
                    client_id: client_id.clone(),
                    from_tier: award.from_tier,
                    to_tier:   award.to_tier,
                    amount:    award.amount,
                },
                now,
            )?;
        }
        Ok(())
    }
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
