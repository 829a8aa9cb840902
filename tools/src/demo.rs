//! Deterministic demo book.
//!
//! Seeds a set of roofing contractors, rolls the program out, then bills
//! and closes several months exactly like production: unit submissions
//! mid-month, batch evaluation on the 1st, counter reset after the batch.
//! Same seed = same book.

use chrono::{Datelike, Days, Months, NaiveDate, TimeZone, Utc};
use loyalty_core::{
    batch::BatchReport, clock::FixedClock, engine::LoyaltyEngine, types::TierId, LoyaltyResult,
};
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Seeded stream for everything the demo randomizes.
pub struct DemoRng {
    inner: Pcg64Mcg,
}

impl DemoRng {
    pub fn new(seed: u64) -> Self {
        Self { inner: Pcg64Mcg::seed_from_u64(seed) }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n). `n` must be positive.
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        self.inner.next_u64() % n.max(1)
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    pub fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.next_u64_below(items.len() as u64) as usize]
    }
}

const NAME_PREFIXES: &[&str] = &[
    "Summit", "Ridgeline", "Peak", "Keystone", "Cedar", "Ironclad", "Northgate",
    "Blue Sky", "Heritage", "Evergreen", "Granite", "Copper", "Lakeside", "Pioneer",
];

const NAME_SUFFIXES: &[&str] = &[
    "Roofing", "Roofing Co", "Exteriors", "Roof & Gutter", "Contracting", "Restoration",
];

/// Typical monthly volume per contractor profile.
const PROFILES: &[(u64, f64)] = &[(2, 0.45), (7, 0.35), (14, 0.20)];

/// Share of submissions that are still being edited at month end.
const LATE_FINALIZE_RATE: f64 = 0.05;

pub struct DemoSummary {
    pub clients:       usize,
    pub months:        Vec<BatchReport>,
    pub cashback_paid: f64,
    pub tier_counts:   Vec<(TierId, i64)>,
}

pub fn run_demo(
    engine: &LoyaltyEngine,
    clock: &FixedClock,
    seed: u64,
    clients: usize,
    months: u32,
) -> LoyaltyResult<DemoSummary> {
    let mut rng = DemoRng::new(seed);
    let start = engine.config.rollout.date;
    clock.set(at(start, 9));

    let mut book = Vec::with_capacity(clients);
    for n in 0..clients {
        let name = format!("{} {}", rng.pick(NAME_PREFIXES), rng.pick(NAME_SUFFIXES));
        let client_id = format!("{}-{n:03}", slug(&name));
        engine.register_client(&client_id)?;
        book.push((client_id, profile(&mut rng)));
    }
    engine.rollout()?;
    log::info!("demo: seeded {} client(s) with seed {seed}", book.len());

    let mut reports = Vec::new();
    let mut month_start = first_of_month(start);
    for _ in 0..months {
        // Mid-month submissions.
        clock.set(at(month_start + Days::new(14), 12));
        let mut late = Vec::new();
        for (client_id, typical) in &book {
            let volume = (*typical as f64 * (0.3 + 1.4 * rng.next_f64())).round() as u64;
            let pieces = 1 + rng.next_u64_below(3);
            for (i, qty) in split(volume, pieces).into_iter().enumerate() {
                let record_id = format!("{client_id}-{}-{i}", month_start.format("%Y%m"));
                engine.record_units(client_id, &record_id, Some(qty), false)?;
                if rng.chance(LATE_FINALIZE_RATE) {
                    late.push((record_id, qty));
                } else {
                    engine.finalize_units(&record_id, qty)?;
                }
            }
        }

        // Month close on the 1st: batch, stragglers, retry, rollover.
        month_start = month_start + Months::new(1);
        clock.set(at(month_start, 1));
        let mut report = engine.evaluate_all_enrolled_clients()?;
        if report.skipped > 0 {
            for (record_id, qty) in &late {
                engine.finalize_units(record_id, *qty)?;
            }
            report = engine.evaluate_all_enrolled_clients()?;
        }
        engine.reset_monthly_counters()?;
        reports.push(report);
    }

    let mut cashback_paid = 0.0;
    for (client_id, _) in &book {
        cashback_paid += engine.client(client_id)?.cashback_balance;
    }

    Ok(DemoSummary {
        clients: book.len(),
        months: reports,
        cashback_paid,
        tier_counts: engine.tier_counts()?,
    })
}

fn profile(rng: &mut DemoRng) -> u64 {
    let roll = rng.next_f64();
    let mut acc = 0.0;
    for (typical, weight) in PROFILES {
        acc += weight;
        if roll < acc {
            return *typical;
        }
    }
    PROFILES[0].0
}

/// Split `total` into `pieces` non-empty parts where possible.
fn split(total: u64, pieces: u64) -> Vec<u64> {
    let pieces = pieces.clamp(1, total.max(1));
    let base = total / pieces;
    let mut parts = vec![base; pieces as usize];
    if let Some(last) = parts.last_mut() {
        *last += total - base * pieces;
    }
    parts
}

fn slug(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn at(date: NaiveDate, hour: u32) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_preserves_total() {
        assert_eq!(split(7, 3), vec![2, 2, 3]);
        assert_eq!(split(0, 2), vec![0]);
        assert_eq!(split(1, 3), vec![1]);
    }

    #[test]
    fn slug_flattens_punctuation() {
        assert_eq!(slug("Roof & Gutter"), "roof-gutter");
        assert_eq!(slug("Blue Sky Roofing Co"), "blue-sky-roofing-co");
    }

    #[test]
    fn same_seed_same_stream() {
        let mut a = DemoRng::new(7);
        let mut b = DemoRng::new(7);
        for _ in 0..16 {
            assert_eq!(a.next_u64_below(1000), b.next_u64_below(1000));
        }
    }
}
