mod common;

use chrono::NaiveDate;
use common::{at, bill, close, enroll, make_engine};
use loyalty_core::{evaluator::EvaluationOutcome, event::LoyaltyEvent, types::TierId};

fn rollout_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// The reset zeroes enrolled counters only and stamps the reset time.
#[test]
fn reset_zeroes_enrolled_counters_only() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Pro);
    engine.register_client("walk-in").unwrap();

    clock.set(at(2026, 9, 12));
    engine.record_units("acme", "a-1", Some(7), true).unwrap();
    engine.record_units("walk-in", "w-1", Some(4), true).unwrap();

    clock.set(at(2026, 10, 1));
    let reset = engine.reset_monthly_counters().unwrap();
    assert_eq!(reset, 1);

    let acme = engine.client("acme").unwrap();
    assert_eq!(acme.current_month_units, 0);
    assert_eq!(acme.counter_reset_at, Some(at(2026, 10, 1)));
    assert_eq!(engine.client("walk-in").unwrap().current_month_units, 4);
    assert_eq!(engine.store.event_count("counters_reset").unwrap(), 1);
}

/// Evaluation snapshots the counter, so it must run before the reset.
/// Late finalization of last month's record after the reset leaves the new
/// month's counter alone.
#[test]
fn finalize_after_reset_does_not_touch_new_counter() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Pro);

    clock.set(at(2026, 9, 12));
    engine.record_units("acme", "sep-1", Some(6), false).unwrap();
    close(&clock, (2026, 9));
    engine.reset_monthly_counters().unwrap();

    let counter = engine.finalize_units("sep-1", 9).unwrap();
    assert_eq!(counter, 0, "September figures must not leak into October");
    assert_eq!(engine.store.unit_record("sep-1").unwrap().unwrap().quantity, Some(9));
}

/// Rollout enrolls every unenrolled client at the rollout tier with empty
/// protection of that type, and a second run enrolls nobody.
#[test]
fn rollout_is_idempotent() {
    let (engine, _clock) = make_engine();
    for id in ["acme", "bolt", "cove"] {
        engine.register_client(id).unwrap();
    }
    engine
        .enroll_client("cove", TierId::Elite, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
        .unwrap();

    let enrolled = engine.rollout().unwrap();
    assert_eq!(enrolled, vec!["acme".to_string(), "bolt".to_string()]);

    for id in ["acme", "bolt"] {
        let client = engine.client(id).unwrap();
        assert_eq!(client.current_tier, TierId::Pro);
        assert_eq!(client.enrolled_date, Some(rollout_date()));
        assert_eq!(client.ledger.protection_type, Some(TierId::Pro));
        assert_eq!((client.ledger.months, client.ledger.points), (0, 0));
    }
    let cove = engine.client("cove").unwrap();
    assert_eq!(cove.current_tier, TierId::Elite, "already enrolled clients are untouched");

    let again = engine.rollout_enroll_all(TierId::Pro, rollout_date()).unwrap();
    assert!(again.is_empty(), "second rollout should enroll nobody, got {again:?}");
    assert_eq!(engine.store.event_count("client_enrolled").unwrap(), 3);
}

/// Rolling out at Casual leaves clients without a protection type.
#[test]
fn rollout_at_casual_has_no_protection() {
    let (engine, _clock) = make_engine();
    engine.register_client("acme").unwrap();

    engine.rollout_enroll_all(TierId::Casual, rollout_date()).unwrap();
    let client = engine.client("acme").unwrap();
    assert_eq!(client.current_tier, TierId::Casual);
    assert_eq!(client.ledger.protection_type, None);

    let events: Vec<LoyaltyEvent> = engine
        .events("acme", 10)
        .unwrap()
        .iter()
        .map(|e| e.decode().unwrap())
        .collect();
    assert!(events.contains(&LoyaltyEvent::ClientEnrolled {
        client_id: "acme".to_string(),
        tier:      TierId::Casual,
        date:      rollout_date(),
    }));
}

/// Clients enrolled by the rollout are picked up by the next evaluation.
#[test]
fn rolled_out_clients_are_evaluated() {
    let (engine, clock) = make_engine();
    engine.register_client("acme").unwrap();
    engine.rollout().unwrap();

    bill(&engine, &clock, "acme", (2026, 9), 2);
    close(&clock, (2026, 9));
    let outcome = engine.evaluate_client("acme").unwrap();
    assert!(
        matches!(&outcome, EvaluationOutcome::Evaluated(s) if s.final_tier == TierId::Casual),
        "Pro with no protection should drop to Casual, got {outcome:?}"
    );
}

/// A client enrolled directly keeps its enrollment on a second call.
#[test]
fn enroll_client_is_idempotent() {
    let (engine, _clock) = make_engine();
    enroll(&engine, "acme", TierId::Elite);

    let state = engine
        .enroll_client("acme", TierId::Casual, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap())
        .unwrap();
    assert_eq!(state.current_tier, TierId::Elite);
    assert_eq!(state.enrolled_date, NaiveDate::from_ymd_opt(2026, 6, 1));
}
