mod common;

use common::{bill, close, enroll, make_engine, run_month};
use loyalty_core::{
    evaluator::{EvaluationOutcome, EvaluationState},
    types::TierId,
};

// ── Tests ────────────────────────────────────────────────────────────────────

/// Points above the Pro minimum carry over month to month until they fill
/// a protection month: 4 + 4 = 8 -> one month banked, 3 points left.
#[test]
fn pro_points_accumulate_across_months() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Pro);

    run_month(&engine, &clock, (2026, 8), &[("acme", 9)]);
    let ledger = engine.client("acme").unwrap().ledger;
    assert_eq!((ledger.months, ledger.points), (0, 4));

    run_month(&engine, &clock, (2026, 9), &[("acme", 9)]);
    let ledger = engine.client("acme").unwrap().ledger;
    assert_eq!(ledger.protection_type, Some(TierId::Pro));
    assert_eq!((ledger.months, ledger.points), (1, 3));

    let history = engine.protection_history("acme", 5).unwrap();
    assert_eq!(history.len(), 2);
    assert!(!history[0].protection_awarded);
    assert!(history[1].protection_awarded);
    assert_eq!(history[1].points_earned, 4);
    assert_eq!(history[1].points_balance_after, 3);
    assert_eq!(history[1].tier_minimum, 5);
}

/// Months never exceed three; excess points stay banked.
#[test]
fn months_are_capped_and_excess_points_kept() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Elite);

    bill(&engine, &clock, "acme", (2026, 9), 100);
    close(&clock, (2026, 9));
    let EvaluationOutcome::Evaluated(summary) = engine.evaluate_client("acme").unwrap() else {
        panic!("expected an evaluation");
    };
    assert_eq!(summary.points_earned, 90);
    assert_eq!(summary.months_awarded, 3);

    let ledger = engine.client("acme").unwrap().ledger;
    assert_eq!(ledger.months, 3, "months must stop at the cap");
    assert_eq!(ledger.points, 60, "points beyond the cap are not discarded");
}

/// A banked month holds the tier through one slow month, then runs out.
#[test]
fn protection_absorbs_one_downgrade_per_month() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Elite);
    engine.adjust_protection_months("acme", 1, "goodwill").unwrap();

    bill(&engine, &clock, "acme", (2026, 9), 3);
    close(&clock, (2026, 9));
    let EvaluationOutcome::Evaluated(summary) = engine.evaluate_client("acme").unwrap() else {
        panic!("expected an evaluation");
    };
    assert!(summary.protection_used);
    assert_eq!(summary.calculated_tier, TierId::Casual);
    assert_eq!(summary.final_tier, TierId::Elite, "protection should hold Elite");
    assert!(summary.path.contains(&EvaluationState::Protected));
    assert!(summary.monthly.protection_used);
    assert_eq!(summary.monthly.price_per_unit, 24.0, "held tier sets the price");

    let client = engine.client("acme").unwrap();
    assert_eq!(client.current_tier, TierId::Elite);
    assert_eq!(client.ledger.months, 0);
    engine.reset_monthly_counters().unwrap();

    // Next slow month: nothing left to spend.
    run_month(&engine, &clock, (2026, 10), &[("acme", 3)]);
    let client = engine.client("acme").unwrap();
    assert_eq!(client.current_tier, TierId::Casual);
    assert_eq!(client.previous_tier, Some(TierId::Elite));
    assert_eq!(client.ledger.protection_type, None, "Casual carries no protection");
    assert_eq!((client.ledger.months, client.ledger.points), (0, 0));
}

/// A downgrade that protection cannot cover clears the old ledger and
/// starts one for the new tier.
#[test]
fn unprotected_downgrade_resets_ledger_to_new_tier() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Elite);
    engine.adjust_protection_points("acme", 7, "carry-over").unwrap();

    run_month(&engine, &clock, (2026, 9), &[("acme", 6)]);
    let client = engine.client("acme").unwrap();
    assert_eq!(client.current_tier, TierId::Pro);
    assert_eq!(client.ledger.protection_type, Some(TierId::Pro));
    assert_eq!((client.ledger.months, client.ledger.points), (0, 0));
}

/// Pro -> Elite converts banked Pro protection at five points per month,
/// then the month's Pro-earned points accrue on the Elite ledger:
/// 2 * 5 + 3 = 13, plus 5 earned = 18 -> one Elite month, 8 points.
#[test]
fn promotion_converts_pro_protection_to_elite_points() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Pro);
    engine.adjust_protection_months("acme", 2, "seed").unwrap();
    engine.adjust_protection_points("acme", 3, "seed").unwrap();

    bill(&engine, &clock, "acme", (2026, 9), 10);
    close(&clock, (2026, 9));
    let EvaluationOutcome::Evaluated(summary) = engine.evaluate_client("acme").unwrap() else {
        panic!("expected an evaluation");
    };
    assert_eq!(summary.final_tier, TierId::Elite);
    assert_eq!(summary.promotion_points, Some(13));
    assert_eq!(summary.points_earned, 5);
    assert_eq!(summary.months_awarded, 1);

    let ledger = engine.client("acme").unwrap().ledger;
    assert_eq!(ledger.protection_type, Some(TierId::Elite));
    assert_eq!((ledger.months, ledger.points), (1, 8));
    assert_eq!(engine.store.event_count("promotion_converted").unwrap(), 1);
}

/// Casual -> Elite has no Pro ledger to convert.
#[test]
fn casual_to_elite_does_not_convert() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Casual);

    bill(&engine, &clock, "acme", (2026, 9), 15);
    close(&clock, (2026, 9));
    let EvaluationOutcome::Evaluated(summary) = engine.evaluate_client("acme").unwrap() else {
        panic!("expected an evaluation");
    };
    assert_eq!(summary.final_tier, TierId::Elite);
    assert_eq!(summary.promotion_points, None);
    assert_eq!(summary.points_earned, 0, "Casual months earn no points");
    assert_eq!(engine.store.event_count("promotion_converted").unwrap(), 0);
}
