//! loyalty-runner: scheduler and operator entry point for the loyalty engine.
//!
//! Usage:
//!   loyalty-runner --db loyalty.db evaluate-all
//!   loyalty-runner --db loyalty.db reset
//!   loyalty-runner --db loyalty.db rollout [--tier pro] [--date 2025-06-01]
//!   loyalty-runner --db loyalty.db status acme-roofing
//!   loyalty-runner --db loyalty.db set-tier acme-roofing elite --reason "contract"
//!   loyalty-runner --seed 42 demo --clients 40 --months 6

mod demo;

use anyhow::{bail, Context, Result};
use loyalty_core::{
    clock::{Clock, FixedClock, SystemClock},
    command::parse_delta,
    config::ProgramConfig,
    engine::LoyaltyEngine,
    evaluator::EvaluationOutcome,
    store::LoyaltyStore,
    types::{TierId, YearMonth},
};
use std::env;
use std::sync::Arc;

/// Flags that take a value; everything else not starting with `--` is a
/// positional argument.
const VALUE_FLAGS: &[&str] = &[
    "--db", "--data-dir", "--workers", "--actor", "--seed", "--tier", "--date",
    "--reason", "--limit", "--month", "--clients", "--months",
];

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let actor = flag_value(&args, "--actor").unwrap_or("scheduler");
    let positional = positionals(&args);

    let Some((&command, rest)) = positional.split_first() else {
        print_usage();
        return Ok(());
    };

    let mut config = match ProgramConfig::load(data_dir) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("{e:#}; using the standard program");
            ProgramConfig::standard()
        }
    };
    config.batch.workers = parse_arg(&args, "--workers", config.batch.workers).max(1);

    let store = if db == ":memory:" {
        LoyaltyStore::in_memory()?
    } else {
        LoyaltyStore::open(db)?
    };
    store.migrate()?;

    if command == "demo" {
        return run_demo(&args, config, store);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = LoyaltyEngine::new(config, store, clock).with_actor(actor);
    let reason = flag_value(&args, "--reason").unwrap_or("manual override");

    match command {
        "evaluate-all" => {
            let report = engine.evaluate_all_enrolled_clients()?;
            println!("=== EVALUATION {} ===", report.month);
            for outcome in &report.outcomes {
                println!("  {outcome}");
            }
            println!(
                "  {} client(s): {} evaluated, {} skipped, {} already evaluated, {} failed",
                report.total(), report.evaluated, report.skipped, report.already_evaluated, report.failed
            );
            if report.failed > 0 {
                println!("  retry: {}", report.failed_ids().join(" "));
                std::process::exit(2);
            }
        }
        "evaluate" => {
            let client_id = arg(rest, 0, "client id")?;
            match engine.evaluate_client(client_id)? {
                EvaluationOutcome::Evaluated(summary) => println!(
                    "{client_id}: {} -> {} ({} units, {})",
                    summary.from_tier,
                    summary.final_tier,
                    summary.units,
                    summary.month
                ),
                EvaluationOutcome::Skipped { pending_count, .. } => {
                    println!("{client_id}: skipped, not ready ({pending_count} pending)")
                }
                EvaluationOutcome::AlreadyEvaluated { month, .. } => {
                    println!("{client_id}: already evaluated for {month}")
                }
            }
        }
        "reset" => {
            let n = engine.reset_monthly_counters()?;
            println!("reset {n} counter(s)");
        }
        "rollout" => {
            let tier = match flag_value(&args, "--tier") {
                Some(t) => t.parse::<TierId>()?,
                None => engine.config.rollout.tier,
            };
            let date = match flag_value(&args, "--date") {
                Some(d) => d.parse::<chrono::NaiveDate>().with_context(|| format!("invalid --date {d}"))?,
                None => engine.config.rollout.date,
            };
            let enrolled = engine.rollout_enroll_all(tier, date)?;
            println!("enrolled {} client(s) at {tier} as of {date}", enrolled.len());
        }
        "register" => {
            let client_id = arg(rest, 0, "client id")?;
            engine.register_client(client_id)?;
            println!("registered {client_id}");
        }
        "record" => {
            let client_id = arg(rest, 0, "client id")?;
            let record_id = arg(rest, 1, "record id")?;
            let qty = arg(rest, 2, "quantity")?
                .parse::<u64>()
                .with_context(|| "quantity must be a whole number")?;
            let finalized = args.iter().any(|a| a == "--final");
            let units = engine.record_units(client_id, record_id, Some(qty), finalized)?;
            println!("{client_id}: {units} unit(s) this month");
        }
        "finalize" => {
            let record_id = arg(rest, 0, "record id")?;
            let qty = arg(rest, 1, "quantity")?
                .parse::<u64>()
                .with_context(|| "quantity must be a whole number")?;
            let units = engine.finalize_units(record_id, qty)?;
            println!("{record_id}: finalized, counter now {units}");
        }
        "status" => {
            let client_id = arg(rest, 0, "client id")?;
            let status = engine.status(client_id)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        "quote" => {
            let units = arg(rest, 0, "units")?
                .parse::<u64>()
                .with_context(|| "units must be a whole number")?;
            println!("{}", serde_json::to_string_pretty(&engine.quote(units))?);
        }
        "history" => {
            let client_id = arg(rest, 0, "client id")?;
            if let Some(month) = flag_value(&args, "--month") {
                let month: YearMonth = month.parse()?;
                let entry = engine.monthly_history_for(client_id, month)?;
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                let limit = parse_arg(&args, "--limit", 12usize);
                let entries = engine.monthly_history(client_id, limit)?;
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
        }
        "audit" => {
            let client_id = arg(rest, 0, "client id")?;
            let limit = parse_arg(&args, "--limit", 20usize);
            let entries = engine.override_audit(client_id, limit)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        "set-tier" => {
            let client_id = arg(rest, 0, "client id")?;
            let tier: TierId = arg(rest, 1, "tier")?.parse()?;
            print_override(&engine.set_tier(client_id, tier, reason)?);
        }
        "adjust-points" => {
            let client_id = arg(rest, 0, "client id")?;
            let delta = parse_delta(arg(rest, 1, "delta")?);
            print_override(&engine.adjust_protection_points(client_id, delta, reason)?);
        }
        "adjust-months" => {
            let client_id = arg(rest, 0, "client id")?;
            let delta = parse_delta(arg(rest, 1, "delta")?);
            print_override(&engine.adjust_protection_months(client_id, delta, reason)?);
        }
        "cashback" => {
            let client_id = arg(rest, 0, "client id")?;
            let amount = arg(rest, 1, "amount")?
                .parse::<f64>()
                .with_context(|| "amount must be a number")?;
            print_override(&engine.apply_cashback(client_id, amount, reason)?);
        }
        other => {
            print_usage();
            bail!("unknown command: {other}");
        }
    }

    Ok(())
}

fn run_demo(args: &[String], config: ProgramConfig, store: LoyaltyStore) -> Result<()> {
    let seed = parse_arg(args, "--seed", 42u64);
    let clients = parse_arg(args, "--clients", 40usize);
    let months = parse_arg(args, "--months", 6u32);

    let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
    let engine = LoyaltyEngine::new(config, store, clock.clone()).with_actor("demo");

    println!("Loyalty tier engine: demo book");
    println!("  seed:     {seed}");
    println!("  clients:  {clients}");
    println!("  months:   {months}");
    println!();

    let summary = demo::run_demo(&engine, &clock, seed, clients, months)?;

    println!("=== MONTH CLOSE ===");
    for report in &summary.months {
        println!(
            "  {} | evaluated {:>3} | skipped {:>2} | failed {:>2}",
            report.month, report.evaluated, report.skipped, report.failed
        );
    }
    println!();
    println!("=== BOOK SUMMARY ===");
    println!("  clients:        {}", summary.clients);
    for (tier, count) in &summary.tier_counts {
        println!("  {tier:<14}  {count}");
    }
    println!("  cashback paid:  ${:.2}", summary.cashback_paid);
    Ok(())
}

fn print_override(entry: &loyalty_core::command::OverrideAuditEntry) {
    println!(
        "{} {} by {}{}",
        entry.command.kind(),
        entry.client_id,
        entry.actor,
        if entry.clamped { " (clamped)" } else { "" }
    );
}

fn print_usage() {
    println!("usage: loyalty-runner [--db PATH] [--data-dir DIR] [--workers N] [--actor NAME] <command>");
    println!("commands:");
    println!("  evaluate-all | evaluate <client> | reset | rollout [--tier T] [--date D]");
    println!("  register <client> | record <client> <record> <qty> [--final] | finalize <record> <qty>");
    println!("  status <client> | quote <units> | history <client> [--limit N | --month YYYY-MM]");
    println!("  audit <client> | set-tier <client> <tier> | adjust-points <client> <delta>");
    println!("  adjust-months <client> <delta> | cashback <client> <amount> [--reason R]");
    println!("  demo [--seed N] [--clients N] [--months N]");
}

fn arg<'a>(rest: &'a [&'a str], index: usize, what: &str) -> Result<&'a str> {
    rest.get(index)
        .copied()
        .with_context(|| format!("missing {what}"))
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn positionals(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(a) = iter.next() {
        if VALUE_FLAGS.contains(&a.as_str()) {
            iter.next();
        } else if !a.starts_with("--") {
            out.push(a.as_str());
        }
    }
    out
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
