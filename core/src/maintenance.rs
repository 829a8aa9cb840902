//! Scheduled housekeeping outside the monthly evaluation.
//!
//!   CounterResetter      start-of-month zeroing of the in-progress counter
//!   RolloutInitializer   one-time enrollment of every unenrolled client
//!
//! Both run as a single transaction and are safe to re-run.

use crate::{
    error::LoyaltyResult,
    event::LoyaltyEvent,
    store::LoyaltyStore,
    tier_table::TierTable,
    types::{ClientId, TierId},
};
use chrono::{DateTime, NaiveDate, Utc};

pub struct CounterResetter;

impl CounterResetter {
    /// Zero `current_month_units` for every enrolled client and stamp the
    /// reset time. Evaluation snapshots the counter first, so this must run
    /// after the batch for the closing month. Returns the clients touched.
    pub fn run(store: &LoyaltyStore, now: DateTime<Utc>) -> LoyaltyResult<usize> {
        let clients = store.immediate(|| {
            let clients = store.reset_enrolled_counters(now)?;
            store.record_event(&LoyaltyEvent::CountersReset { clients, at: now }, now)?;
            Ok(clients)
        })?;
        log::info!("counters: reset {clients} enrolled client(s) at {now}");
        Ok(clients)
    }
}

pub struct RolloutInitializer<'a> {
    tiers: &'a TierTable,
}

impl<'a> RolloutInitializer<'a> {
    pub fn new(tiers: &'a TierTable) -> Self {
        Self { tiers }
    }

    /// Enroll every not-yet-enrolled client at `tier` as of `date`, with
    /// empty protection of the matching type. Clients already enrolled are
    /// left alone, so a second run enrolls nobody.
    pub fn run(
        &self,
        store: &LoyaltyStore,
        tier: TierId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<Vec<ClientId>> {
        let def = self.tiers.get(tier);
        let protection_type = def.earns_protection().then_some(tier);

        let enrolled = store.immediate(|| {
            let ids = store.enroll_unenrolled(tier, protection_type, date)?;
            for id in &ids {
                store.record_event(
                    &LoyaltyEvent::ClientEnrolled { client_id: id.clone(), tier, date },
                    now,
                )?;
            }
            Ok(ids)
        })?;

        if enrolled.is_empty() {
            log::info!("rollout: no unenrolled clients, nothing to do");
        } else {
            log::info!("rollout: enrolled {} client(s) at {tier} as of {date}", enrolled.len());
        }
        Ok(enrolled)
    }
}
