mod common;

use common::{enroll, make_engine, run_month};
use loyalty_core::{engine::LoyaltyEngine, types::TierId};

// ── Test helpers ────────────────────────────────────────────────────────────

/// Give the client billing history without replaying months.
fn set_lifetime(engine: &LoyaltyEngine, client_id: &str, units: u64, qualified: bool) {
    let mut state = engine.client(client_id).unwrap();
    state.lifetime_units_billed = units;
    state.meets_lifetime_minimum = qualified;
    engine.store.save_client(&state).unwrap();
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// An upgrade by a qualified client pays the fixed credit once. Cycling
/// back down and up again does not pay the same pair twice.
#[test]
fn cashback_paid_once_per_upgrade_pair() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Pro);
    set_lifetime(&engine, "acme", 60, true);

    run_month(&engine, &clock, (2026, 8), &[("acme", 10)]);
    let client = engine.client("acme").unwrap();
    assert_eq!(client.current_tier, TierId::Elite);
    assert_eq!(client.cashback_balance, 100.0);
    assert_eq!(client.cashback_awards.len(), 1);
    assert_eq!(client.cashback_awards[0].from_tier, TierId::Pro);
    assert_eq!(client.cashback_awards[0].to_tier, TierId::Elite);

    run_month(&engine, &clock, (2026, 9), &[("acme", 5)]);
    assert_eq!(engine.client("acme").unwrap().current_tier, TierId::Pro);

    run_month(&engine, &clock, (2026, 10), &[("acme", 10)]);
    let client = engine.client("acme").unwrap();
    assert_eq!(client.current_tier, TierId::Elite);
    assert_eq!(client.cashback_balance, 100.0, "Pro -> Elite must not pay twice");
    assert_eq!(client.cashback_awards.len(), 1);
    assert_eq!(engine.store.event_count("cashback_awarded").unwrap(), 1);
}

/// A different upgrade pair is a separate award.
#[test]
fn each_distinct_pair_pays_once() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Casual);
    set_lifetime(&engine, "acme", 80, true);

    run_month(&engine, &clock, (2026, 7), &[("acme", 6)]);  // Casual -> Pro
    run_month(&engine, &clock, (2026, 8), &[("acme", 12)]); // Pro -> Elite
    run_month(&engine, &clock, (2026, 9), &[("acme", 1)]);  // Elite -> Casual
    run_month(&engine, &clock, (2026, 10), &[("acme", 20)]); // Casual -> Elite

    let client = engine.client("acme").unwrap();
    let pairs: Vec<(TierId, TierId)> = client
        .cashback_awards
        .iter()
        .map(|a| (a.from_tier, a.to_tier))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (TierId::Casual, TierId::Pro),
            (TierId::Pro, TierId::Elite),
            (TierId::Casual, TierId::Elite),
        ]
    );
    assert_eq!(client.cashback_balance, 300.0);
}

/// Without the lifetime minimum an upgrade pays nothing.
#[test]
fn no_cashback_below_lifetime_minimum() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Pro);

    run_month(&engine, &clock, (2026, 9), &[("acme", 10)]);
    let client = engine.client("acme").unwrap();
    assert_eq!(client.current_tier, TierId::Elite);
    assert_eq!(client.cashback_balance, 0.0);
    assert!(client.cashback_awards.is_empty());
}

/// The lifetime flag is updated after the tier change, so the month that
/// crosses the minimum does not itself pay. The flag then sticks.
#[test]
fn minimum_reached_in_upgrade_month_pays_nothing_that_month() {
    let (engine, clock) = make_engine();
    enroll(&engine, "acme", TierId::Pro);
    set_lifetime(&engine, "acme", 45, false);

    run_month(&engine, &clock, (2026, 9), &[("acme", 10)]);
    let client = engine.client("acme").unwrap();
    assert_eq!(client.current_tier, TierId::Elite);
    assert_eq!(client.cashback_balance, 0.0);
    assert!(client.meets_lifetime_minimum, "55 lifetime units should qualify");
    assert_eq!(client.lifetime_units_billed, 55);

    // Quiet month: flag stays set.
    run_month(&engine, &clock, (2026, 10), &[("acme", 0)]);
    assert!(engine.client("acme").unwrap().meets_lifetime_minimum);
}
