//! Batch runner: evaluates every enrolled client once per cycle.
//!
//! RULES:
//!   - One client's failure never stops the batch.
//!   - A client id appears in exactly one worker's partition, so no two
//!     evaluations of the same client ever run at once.
//!   - No retries. Failed ids are reported for the scheduler to re-target.

use crate::{
    config::ProgramConfig,
    error::{LoyaltyError, LoyaltyResult},
    evaluator::{EvaluationOutcome, MonthlyEvaluator},
    store::LoyaltyStore,
    types::{ClientId, TierId, YearMonth},
    units::UnitSource,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-client result as shown to operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClientOutcome {
    Evaluated {
        client_id: ClientId,
        from_tier: TierId,
        tier:      TierId,
    },
    Skipped {
        client_id:     ClientId,
        reason:        String,
        pending_count: usize,
    },
    AlreadyEvaluated {
        client_id: ClientId,
    },
    Failed {
        client_id: ClientId,
        error:     String,
    },
}

impl ClientOutcome {
    pub fn from_result(client_id: &str, result: LoyaltyResult<EvaluationOutcome>) -> Self {
        match result {
            Ok(EvaluationOutcome::Evaluated(summary)) => Self::Evaluated {
                client_id: client_id.to_string(),
                from_tier: summary.from_tier,
                tier:      summary.final_tier,
            },
            Ok(EvaluationOutcome::Skipped { reason, pending_count, .. }) => Self::Skipped {
                client_id: client_id.to_string(),
                reason,
                pending_count,
            },
            Ok(EvaluationOutcome::AlreadyEvaluated { .. }) => Self::AlreadyEvaluated {
                client_id: client_id.to_string(),
            },
            Err(e) => Self::Failed {
                client_id: client_id.to_string(),
                error:     e.to_string(),
            },
        }
    }

    pub fn client_id(&self) -> &str {
        match self {
            Self::Evaluated { client_id, .. }
            | Self::Skipped { client_id, .. }
            | Self::AlreadyEvaluated { client_id }
            | Self::Failed { client_id, .. } => client_id,
        }
    }
}

impl fmt::Display for ClientOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evaluated { client_id, tier, .. } => {
                write!(f, "{client_id}: evaluated, tier {tier}")
            }
            Self::Skipped { client_id, pending_count, .. } => {
                write!(f, "{client_id}: skipped, not ready ({pending_count} pending)")
            }
            Self::AlreadyEvaluated { client_id } => {
                write!(f, "{client_id}: skipped, already evaluated")
            }
            Self::Failed { client_id, error } => {
                write!(f, "{client_id}: failed, {error}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub month:             YearMonth,
    pub evaluated:         usize,
    pub skipped:           usize,
    pub already_evaluated: usize,
    pub failed:            usize,
    pub outcomes:          Vec<ClientOutcome>,
}

impl BatchReport {
    pub fn new(month: YearMonth) -> Self {
        Self {
            month,
            evaluated: 0,
            skipped: 0,
            already_evaluated: 0,
            failed: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: ClientOutcome) {
        match &outcome {
            ClientOutcome::Evaluated { .. }        => self.evaluated += 1,
            ClientOutcome::Skipped { .. }          => self.skipped += 1,
            ClientOutcome::AlreadyEvaluated { .. } => self.already_evaluated += 1,
            ClientOutcome::Failed { .. }           => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ClientOutcome::Failed { .. }))
            .map(ClientOutcome::client_id)
            .collect()
    }

    pub fn outcome_for(&self, client_id: &str) -> Option<&ClientOutcome> {
        self.outcomes.iter().find(|o| o.client_id() == client_id)
    }
}

pub struct BatchRunner {
    evaluator: MonthlyEvaluator,
    workers:   usize,
}

impl BatchRunner {
    pub fn new(config: &ProgramConfig) -> Self {
        Self {
            evaluator: MonthlyEvaluator::new(config),
            workers:   config.batch.workers.max(1),
        }
    }

    pub fn evaluator(&self) -> &MonthlyEvaluator {
        &self.evaluator
    }

    /// Evaluate `ids` one after another on the caller's connection.
    pub fn run(
        &self,
        store: &LoyaltyStore,
        units: &dyn UnitSource,
        ids: &[ClientId],
        now: DateTime<Utc>,
    ) -> BatchReport {
        let month = MonthlyEvaluator::month_under_review(now);
        log::info!("month={month} batch: evaluating {} enrolled client(s)", ids.len());

        let mut report = BatchReport::new(month);
        for id in dedup(ids) {
            let result = self.evaluator.run_for_client(store, units, id, now);
            if let Err(e) = &result {
                log_failure(id, e);
            }
            report.record(ClientOutcome::from_result(id, result));
        }

        log_summary(&report);
        report
    }

    /// Evaluate `ids` across the configured worker count. Each worker opens
    /// its own connection and reads units from the store. Falls back to a
    /// sequential run when the database cannot be shared between
    /// connections or only one worker is configured.
    pub fn run_parallel(&self, store: &LoyaltyStore, ids: &[ClientId], now: DateTime<Utc>) -> BatchReport {
        if self.workers <= 1 || !store.is_shared() || ids.len() <= 1 {
            return self.run(store, store, ids, now);
        }

        let month = MonthlyEvaluator::month_under_review(now);
        let unique = dedup(ids);
        let chunk_size = unique.len().div_ceil(self.workers);
        log::info!(
            "month={month} batch: evaluating {} enrolled client(s) on {} worker(s)",
            unique.len(), self.workers
        );

        // Connections are Send but not Sync: open one per worker here and
        // move it into the thread.
        let partitions: Vec<(Vec<&ClientId>, LoyaltyResult<LoyaltyStore>)> = unique
            .chunks(chunk_size)
            .map(|part| (part.to_vec(), store.reopen()))
            .collect();

        let mut outcomes: Vec<ClientOutcome> = std::thread::scope(|scope| {
            let handles: Vec<_> = partitions
                .into_iter()
                .map(|(part, worker_store)| {
                    let ids: Vec<ClientId> = part.iter().map(|id| id.to_string()).collect();
                    let handle = scope.spawn(move || self.run_partition(worker_store, &part, now));
                    (ids, handle)
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|(ids, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        ids.into_iter()
                            .map(|client_id| ClientOutcome::Failed {
                                client_id,
                                error: "worker panicked".to_string(),
                            })
                            .collect()
                    })
                })
                .collect()
        });
        outcomes.sort_by(|a, b| a.client_id().cmp(b.client_id()));

        let mut report = BatchReport::new(month);
        for outcome in outcomes {
            report.record(outcome);
        }
        log_summary(&report);
        report
    }

    fn run_partition(
        &self,
        worker_store: LoyaltyResult<LoyaltyStore>,
        ids: &[&ClientId],
        now: DateTime<Utc>,
    ) -> Vec<ClientOutcome> {
        let worker_store = match worker_store {
            Ok(s) => s,
            Err(e) => {
                log::warn!("batch: worker could not open store: {e}");
                return ids
                    .iter()
                    .map(|id| ClientOutcome::Failed {
                        client_id: id.to_string(),
                        error:     e.to_string(),
                    })
                    .collect();
            }
        };

        ids.iter()
            .map(|id| {
                let result = self.evaluator.run_for_client(&worker_store, &worker_store, id, now);
                if let Err(e) = &result {
                    log_failure(id, e);
                }
                ClientOutcome::from_result(id, result)
            })
            .collect()
    }
}

fn dedup(ids: &[ClientId]) -> Vec<&ClientId> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().filter(|id| seen.insert(id.as_str())).collect()
}

/// Persistence failures roll the client back and are worth an operator's
/// attention; anything else is a data problem for that one client.
fn log_failure(client_id: &str, error: &LoyaltyError) {
    if error.is_persistence_failure() {
        log::error!("batch: {client_id} rolled back: {error}");
    } else {
        log::warn!("batch: {client_id} failed: {error}");
    }
}

fn log_summary(report: &BatchReport) {
    log::info!(
        "month={} batch: {} evaluated, {} skipped, {} already evaluated, {} failed",
        report.month, report.evaluated, report.skipped, report.already_evaluated, report.failed
    );
}
