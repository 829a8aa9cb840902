//! The loyalty engine: one entry point wiring config, clock, store and
//! every scheduled job together.
//!
//! TRIGGER SURFACE:
//!   evaluate_client               one client, one month
//!   evaluate_all_enrolled_clients month-start batch
//!   reset_monthly_counters        month-start, after the batch
//!   rollout_enroll_all            one-time, idempotent
//!   apply_override                operator commands, always audited
//!
//! RULES:
//!   - Every mutation commits together with its event log entries.
//!   - `now` is read from the clock once per call and threaded through.
//!   - Overrides never fail on out-of-range input; they clamp and say so.

use crate::{
    batch::{BatchReport, BatchRunner},
    clock::{Clock, FixedClock, SystemClock},
    command::{AdminCommand, OverrideAuditEntry},
    config::ProgramConfig,
    error::{LoyaltyError, LoyaltyResult},
    evaluator::EvaluationOutcome,
    event::{EventLogEntry, LoyaltyEvent},
    maintenance::{CounterResetter, RolloutInitializer},
    protection_ledger::ProtectionLedger,
    report::{ClientStatus, PriceQuote},
    state::{ClientLoyaltyState, MonthlyHistoryEntry, ProtectionHistoryEntry},
    store::LoyaltyStore,
    types::{ClientId, TierId, Units, YearMonth},
    units::{checked_quantity, UnitRecord, UnitSource},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;

const DEFAULT_ACTOR: &str = "system";

pub struct LoyaltyEngine {
    pub config: ProgramConfig,
    pub store:  LoyaltyStore,
    clock:      Arc<dyn Clock>,
    batch:      BatchRunner,
    /// External unit feed. `None` reads unit records from the store.
    units:      Option<Box<dyn UnitSource>>,
    actor:      String,
}

impl LoyaltyEngine {
    pub fn new(config: ProgramConfig, store: LoyaltyStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            batch: BatchRunner::new(&config),
            config,
            store,
            clock,
            units: None,
            actor: DEFAULT_ACTOR.to_string(),
        }
    }

    /// Engine on the wall clock with config read from `data_dir`.
    /// The store must already be migrated.
    pub fn build(store: LoyaltyStore, data_dir: &str) -> LoyaltyResult<Self> {
        let config = ProgramConfig::load(data_dir)?;
        Ok(Self::new(config, store, Arc::new(SystemClock)))
    }

    /// In-memory, migrated, standard program, pinned clock.
    pub fn build_test(clock: Arc<FixedClock>) -> LoyaltyResult<Self> {
        Self::build_test_with(ProgramConfig::standard(), clock)
    }

    pub fn build_test_with(config: ProgramConfig, clock: Arc<FixedClock>) -> LoyaltyResult<Self> {
        let store = LoyaltyStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(config, store, clock))
    }

    pub fn with_unit_source(mut self, units: Box<dyn UnitSource>) -> Self {
        self.units = Some(units);
        self
    }

    /// Name recorded on every override audit row.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn unit_source(&self) -> &dyn UnitSource {
        match &self.units {
            Some(units) => units.as_ref(),
            None => &self.store,
        }
    }

    // ── Registration and units ────────────────────────────────────

    /// Create a client with all-zero, unenrolled state.
    pub fn register_client(&self, client_id: &str) -> LoyaltyResult<ClientLoyaltyState> {
        let now = self.now();
        let state = ClientLoyaltyState::new(client_id);
        self.store.immediate(|| {
            self.store.insert_client(&state, now)?;
            self.store.record_event(
                &LoyaltyEvent::ClientRegistered { client_id: client_id.to_string() },
                now,
            )
        })?;
        log::debug!("engine: registered {client_id}");
        Ok(state)
    }

    /// Enroll one client that joined after the rollout. Enrolling an
    /// already enrolled client changes nothing.
    pub fn enroll_client(
        &self,
        client_id: &str,
        tier: TierId,
        date: NaiveDate,
    ) -> LoyaltyResult<ClientLoyaltyState> {
        let now = self.now();
        self.store.immediate(|| {
            let mut state = self.store.require_client(client_id)?;
            if state.is_enrolled() {
                log::info!("engine: {client_id} already enrolled, left unchanged");
                return Ok(state);
            }
            state.enrolled_date = Some(date);
            state.current_tier = tier;
            state.tier_effective_date = Some(date.and_time(NaiveTime::MIN).and_utc());
            state.ledger = ProtectionLedger::for_tier(self.config.tiers.get(tier));
            self.store.save_client(&state)?;
            self.store.record_event(
                &LoyaltyEvent::ClientEnrolled { client_id: client_id.to_string(), tier, date },
                now,
            )?;
            Ok(state)
        })
    }

    /// Record a unit submission for the current month. A known quantity
    /// counts toward the in-progress counter straight away; it only counts
    /// toward readiness once finalized. Returns the updated counter.
    pub fn record_units(
        &self,
        client_id: &str,
        record_id: &str,
        quantity: Option<Units>,
        finalized: bool,
    ) -> LoyaltyResult<Units> {
        let delta = quantity.map(checked_quantity).transpose()?;
        let now = self.now();
        let record = UnitRecord {
            record_id: record_id.to_string(),
            client_id: client_id.to_string(),
            month:     YearMonth::of(&now),
            quantity,
            finalized,
        };
        self.store.immediate(|| {
            self.store.require_client(client_id)?;
            self.store.insert_unit_record(&record, now)?;
            match delta {
                Some(delta) => self.store.adjust_current_month_units(client_id, delta),
                None => self.store.current_month_units(client_id),
            }
        })
    }

    /// Lock in a record's final quantity. The counter moves by the
    /// difference only while it still covers the record's month.
    pub fn finalize_units(&self, record_id: &str, quantity: Units) -> LoyaltyResult<Units> {
        let finalized = checked_quantity(quantity)?;
        self.store.immediate(|| {
            let record = self.store.unit_record(record_id)?.ok_or_else(|| {
                LoyaltyError::Other(anyhow::anyhow!("unit record '{record_id}' not found"))
            })?;
            let state = self.store.require_client(&record.client_id)?;
            let previous = self.store.finalize_unit_record(record_id, quantity)?;

            let counter_covers_month = state
                .counter_reset_at
                .is_none_or(|at| YearMonth::of(&at) <= record.month);
            if !counter_covers_month {
                return Ok(state.current_month_units);
            }
            let delta = finalized - previous.map_or(Ok(0), checked_quantity)?;
            self.store.adjust_current_month_units(&record.client_id, delta)
        })
    }

    // ── Trigger surface ───────────────────────────────────────────

    /// Evaluate the month before `now` for one client.
    pub fn evaluate_client(&self, client_id: &str) -> LoyaltyResult<EvaluationOutcome> {
        let now = self.now();
        self.batch
            .evaluator()
            .run_for_client(&self.store, self.unit_source(), client_id, now)
    }

    /// Evaluate every enrolled client. Per-client failures land in the
    /// report; only failing to list the clients is an error.
    pub fn evaluate_all_enrolled_clients(&self) -> LoyaltyResult<BatchReport> {
        let now = self.now();
        let ids: Vec<ClientId> = self.store.enrolled_client_ids()?;
        let report = match &self.units {
            Some(units) => self.batch.run(&self.store, units.as_ref(), &ids, now),
            None => self.batch.run_parallel(&self.store, &ids, now),
        };
        Ok(report)
    }

    pub fn reset_monthly_counters(&self) -> LoyaltyResult<usize> {
        CounterResetter::run(&self.store, self.now())
    }

    pub fn rollout_enroll_all(&self, tier: TierId, date: NaiveDate) -> LoyaltyResult<Vec<ClientId>> {
        RolloutInitializer::new(&self.config.tiers).run(&self.store, tier, date, self.now())
    }

    /// Rollout with the configured tier and date.
    pub fn rollout(&self) -> LoyaltyResult<Vec<ClientId>> {
        let rollout = self.config.rollout.clone();
        self.rollout_enroll_all(rollout.tier, rollout.date)
    }

    // ── Overrides ─────────────────────────────────────────────────

    /// Apply an operator command to one client. The change, its audit row
    /// and its event commit together.
    pub fn apply_override(
        &self,
        client_id: &str,
        command: AdminCommand,
        reason: &str,
    ) -> LoyaltyResult<OverrideAuditEntry> {
        let now = self.now();
        let entry = self.store.immediate(|| {
            let mut state = self.store.require_client(client_id)?;
            let clamped = self.apply_command(&mut state, &command, now);
            self.store.save_client(&state)?;

            let entry = OverrideAuditEntry {
                audit_id:   uuid::Uuid::new_v4().to_string(),
                client_id:  client_id.to_string(),
                command:    command.clone(),
                reason:     reason.to_string(),
                actor:      self.actor.clone(),
                clamped,
                created_at: now,
            };
            self.store.append_override_audit(&entry)?;
            self.store.record_event(
                &LoyaltyEvent::OverrideApplied {
                    client_id: client_id.to_string(),
                    kind:      command.kind().to_string(),
                    clamped,
                },
                now,
            )?;
            Ok(entry)
        })?;

        log::info!(
            "override: {} {client_id} by {} ({reason}){}",
            entry.command.kind(),
            entry.actor,
            if entry.clamped { " [clamped]" } else { "" }
        );
        Ok(entry)
    }

    pub fn set_tier(&self, client_id: &str, tier: TierId, reason: &str) -> LoyaltyResult<OverrideAuditEntry> {
        self.apply_override(client_id, AdminCommand::SetTier { tier }, reason)
    }

    pub fn adjust_protection_points(&self, client_id: &str, delta: i64, reason: &str) -> LoyaltyResult<OverrideAuditEntry> {
        self.apply_override(client_id, AdminCommand::AdjustProtectionPoints { delta }, reason)
    }

    pub fn adjust_protection_months(&self, client_id: &str, delta: i64, reason: &str) -> LoyaltyResult<OverrideAuditEntry> {
        self.apply_override(client_id, AdminCommand::AdjustProtectionMonths { delta }, reason)
    }

    pub fn apply_cashback(&self, client_id: &str, amount: f64, reference: &str) -> LoyaltyResult<OverrideAuditEntry> {
        self.apply_override(
            client_id,
            AdminCommand::ApplyCashback { amount, reference: reference.to_string() },
            reference,
        )
    }

    /// Mutate `state` per `command`. Returns true when the request was
    /// clamped to keep the state valid.
    fn apply_command(&self, state: &mut ClientLoyaltyState, command: &AdminCommand, now: DateTime<Utc>) -> bool {
        let tiers = &self.config.tiers;
        let max_months = self.config.max_protection_months;

        match command {
            AdminCommand::SetTier { tier } => {
                let def = tiers.get(*tier);
                if state.current_tier != *tier {
                    state.previous_tier = Some(state.current_tier);
                    state.current_tier = *tier;
                    state.tier_effective_date = Some(now);
                }
                if state.ledger.protection_type != def.earns_protection().then_some(*tier) {
                    state.ledger = ProtectionLedger::for_tier(def);
                }
                false
            }
            AdminCommand::AdjustProtectionPoints { delta } => {
                let Some(ptype) = self.protection_type_for(state) else {
                    log::warn!(
                        "override: {} has no protection type, points adjustment ignored",
                        state.client_id
                    );
                    return *delta != 0;
                };
                let def = tiers.get(ptype);
                if state.ledger.protection_type != Some(ptype) {
                    state.ledger = ProtectionLedger::for_tier(def);
                }
                if *delta >= 0 {
                    state.ledger.accrue(def, *delta as u64, max_months);
                    false
                } else {
                    let cut = delta.unsigned_abs();
                    if cut > state.ledger.points {
                        log::warn!(
                            "override: {} points {} {delta} clamped to 0",
                            state.client_id, state.ledger.points
                        );
                        state.ledger.points = 0;
                        true
                    } else {
                        state.ledger.points -= cut;
                        false
                    }
                }
            }
            AdminCommand::AdjustProtectionMonths { delta } => {
                let Some(ptype) = self.protection_type_for(state) else {
                    log::warn!(
                        "override: {} has no protection type, months adjustment ignored",
                        state.client_id
                    );
                    return *delta != 0;
                };
                if state.ledger.protection_type != Some(ptype) {
                    state.ledger = ProtectionLedger::for_tier(tiers.get(ptype));
                }
                let target = (state.ledger.months as i64).saturating_add(*delta);
                let months = target.clamp(0, max_months as i64);
                if months != target {
                    log::warn!(
                        "override: {} months {} {delta:+} clamped to {months}",
                        state.client_id, state.ledger.months
                    );
                }
                state.ledger.months = months as u32;
                months != target
            }
            AdminCommand::ApplyCashback { amount, .. } => {
                if !amount.is_finite() {
                    log::warn!("override: {} cashback amount {amount} ignored", state.client_id);
                    return true;
                }
                let balance = state.cashback_balance + amount;
                if balance < 0.0 {
                    log::warn!(
                        "override: {} cashback balance {:.2} {amount:+.2} clamped to 0",
                        state.client_id, state.cashback_balance
                    );
                    state.cashback_balance = 0.0;
                    true
                } else {
                    state.cashback_balance = balance;
                    false
                }
            }
        }
    }

    /// Ledger type to adjust: the banked one, else the current tier's.
    fn protection_type_for(&self, state: &ClientLoyaltyState) -> Option<TierId> {
        state.ledger.protection_type.or_else(|| {
            self.config
                .tiers
                .get(state.current_tier)
                .earns_protection()
                .then_some(state.current_tier)
        })
    }

    // ── Reads ─────────────────────────────────────────────────────

    pub fn client(&self, client_id: &str) -> LoyaltyResult<ClientLoyaltyState> {
        self.store.require_client(client_id)
    }

    pub fn status(&self, client_id: &str) -> LoyaltyResult<ClientStatus> {
        let state = self.store.require_client(client_id)?;
        Ok(ClientStatus::from_state(&state, &self.config))
    }

    pub fn quote(&self, units: Units) -> PriceQuote {
        PriceQuote::for_units(&self.config, units)
    }

    pub fn monthly_history(&self, client_id: &str, limit: usize) -> LoyaltyResult<Vec<MonthlyHistoryEntry>> {
        self.store.require_client(client_id)?;
        self.store.monthly_history(client_id, limit)
    }

    pub fn monthly_history_for(&self, client_id: &str, month: YearMonth) -> LoyaltyResult<Option<MonthlyHistoryEntry>> {
        self.store.monthly_history_for(client_id, month)
    }

    pub fn protection_history(&self, client_id: &str, limit: usize) -> LoyaltyResult<Vec<ProtectionHistoryEntry>> {
        self.store.require_client(client_id)?;
        self.store.protection_history(client_id, limit)
    }

    pub fn override_audit(&self, client_id: &str, limit: usize) -> LoyaltyResult<Vec<OverrideAuditEntry>> {
        self.store.override_audit(client_id, limit)
    }

    pub fn events(&self, client_id: &str, limit: usize) -> LoyaltyResult<Vec<EventLogEntry>> {
        self.store.events_for_client(client_id, limit)
    }

    pub fn tier_counts(&self) -> LoyaltyResult<Vec<(TierId, i64)>> {
        self.store.tier_counts()
    }
}
