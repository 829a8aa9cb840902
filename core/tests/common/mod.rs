#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use loyalty_core::{
    batch::BatchReport, clock::FixedClock, engine::LoyaltyEngine, types::TierId,
};
use std::sync::Arc;

// ── Test helpers ────────────────────────────────────────────────────────────

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0).unwrap()
}

pub fn make_engine() -> (LoyaltyEngine, Arc<FixedClock>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(FixedClock::new(at(2026, 9, 1)));
    let engine = LoyaltyEngine::build_test(clock.clone()).unwrap();
    (engine, clock)
}

/// Register `client_id` and enroll it at `tier` before any test month.
pub fn enroll(engine: &LoyaltyEngine, client_id: &str, tier: TierId) {
    engine.register_client(client_id).unwrap();
    engine
        .enroll_client(client_id, tier, NaiveDate::from_ymd_opt(2026, 6, 1).unwrap())
        .unwrap();
}

/// Submit one finalized record of `units` mid-`(year, month)`.
pub fn bill(engine: &LoyaltyEngine, clock: &FixedClock, client_id: &str, (year, month): (i32, u32), units: u64) {
    clock.set(at(year, month, 15));
    let record_id = format!("{client_id}-{year}{month:02}");
    engine.record_units(client_id, &record_id, Some(units), true).unwrap();
}

/// Move the clock to the 1st of the month after `(year, month)`.
pub fn close(clock: &FixedClock, (year, month): (i32, u32)) {
    let (y, m) = next_month((year, month));
    clock.set(at(y, m, 1));
}

pub fn next_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

/// One full production month: bill every client, close, batch, reset.
pub fn run_month(
    engine: &LoyaltyEngine,
    clock: &FixedClock,
    month: (i32, u32),
    usage: &[(&str, u64)],
) -> BatchReport {
    for (client_id, units) in usage {
        bill(engine, clock, client_id, month, *units);
    }
    close(clock, month);
    let report = engine.evaluate_all_enrolled_clients().unwrap();
    engine.reset_monthly_counters().unwrap();
    report
}
