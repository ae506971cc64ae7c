//! Parallel dispatch of independent generation units.
//!
//! Page generation is embarrassingly parallel — every output artifact
//! depends only on its own inputs — so the scheduler's job is fan-out,
//! fault isolation, and fan-in, nothing more.
//!
//! # Design
//!
//! Each build constructs its own fixed-size [rayon](https://docs.rs/rayon)
//! pool (never the global one, so library consumers keep their own pool
//! configuration). The pool size is `min(32, available CPU cores + 4)`:
//! unit workers spend most of their time blocked on file writes, so a few
//! more threads than cores keeps the cores busy, while the cap of 32 stops
//! a many-core machine from drowning in idle threads. User config can
//! constrain the pool down, never up.
//!
//! ## Fault isolation
//!
//! A unit's failure is converted to a [`UnitResult`] at the unit boundary.
//! It is logged with the unit's key and counted; the remaining units keep
//! running. There is no cancellation and no per-unit timeout — once
//! dispatched, a unit runs to success or failure.
//!
//! ## Fan-in
//!
//! [`Scheduler::run`] is a barrier: it returns only after every submitted
//! unit reached a terminal state, so callers may safely touch shared state
//! (cache commits, snapshot saves) single-threaded afterwards. Completion
//! order is arbitrary; results stream over the optional event channel in
//! completion order for progress display, while the returned list preserves
//! submission order. Workers share no mutable state — any per-unit context
//! must be an independent copy, which is the caller's responsibility when
//! building the worker closure.

use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use thiserror::Error;

use crate::output;
use crate::recovery::RecoveryError;

/// Hard ceiling on pool size regardless of core count.
const MAX_POOL_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("worker pool construction failed: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// One independent piece of generation work.
#[derive(Debug, Clone)]
pub struct Unit {
    /// Opaque identity used in results and logs (e.g. a page slug).
    pub key: String,
    /// Artifact path this unit targets.
    pub output_path: PathBuf,
    /// Input file backing the unit, when there is one.
    pub source_path: Option<PathBuf>,
}

/// Why a unit permanently failed.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("write failed: {0}")]
    Write(RecoveryError),
    #[error("{0}")]
    Other(String),
}

impl UnitError {
    /// Short failure-kind label for results and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            UnitError::Io(_) => "io",
            UnitError::Write(_) => "write",
            UnitError::Other(_) => "other",
        }
    }
}

/// Terminal state of one dispatched unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Success,
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone)]
pub struct UnitResult {
    pub key: String,
    pub outcome: UnitOutcome,
}

impl UnitResult {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Failed { .. })
    }
}

/// Fixed-size worker pool for one build invocation.
pub struct Scheduler {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl Scheduler {
    /// Build a pool of [`effective_workers`]`(max_workers)` threads.
    pub fn new(max_workers: Option<usize>) -> Result<Self, SchedulerError> {
        let workers = effective_workers(max_workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Execute every unit through `worker`, returning one result per unit.
    ///
    /// Worker failures are caught at the unit boundary and never abort
    /// sibling units. The call returns only once all units are terminal.
    /// When an event sender is supplied, each result is also sent on
    /// completion for live progress display.
    pub fn run(
        &self,
        units: &[Unit],
        worker: impl Fn(&Unit) -> Result<(), UnitError> + Sync,
        events: Option<Sender<UnitResult>>,
    ) -> Vec<UnitResult> {
        self.pool.install(|| {
            units
                .par_iter()
                .map_with(events, |events, unit| {
                    let result = match worker(unit) {
                        Ok(()) => UnitResult {
                            key: unit.key.clone(),
                            outcome: UnitOutcome::Success,
                        },
                        Err(err) => {
                            output::warn(
                                "scheduler",
                                &format!("unit {} failed: {}: {err}", unit.key, err.kind()),
                            );
                            UnitResult {
                                key: unit.key.clone(),
                                outcome: UnitOutcome::Failed {
                                    kind: err.kind().to_string(),
                                    message: err.to_string(),
                                },
                            }
                        }
                    };
                    if let Some(tx) = events {
                        // A dropped receiver only disables progress display
                        tx.send(result.clone()).ok();
                    }
                    result
                })
                .collect()
        })
    }
}

/// Resolve the effective worker count.
///
/// - `None` → `min(32, cores + 4)`
/// - `Some(n)` → same ceiling applied (user can constrain down, not up)
pub fn effective_workers(max_workers: Option<usize>) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let auto = (cores + 4).min(MAX_POOL_SIZE);
    max_workers.map(|n| n.min(auto)).unwrap_or(auto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::mpsc;

    fn test_units(n: usize) -> Vec<Unit> {
        (1..=n)
            .map(|i| Unit {
                key: format!("unit-{i}"),
                output_path: PathBuf::from(format!("out/unit-{i}.html")),
                source_path: None,
            })
            .collect()
    }

    // =========================================================================
    // Fault isolation
    // =========================================================================

    #[test]
    fn one_failing_unit_does_not_cancel_siblings() {
        let scheduler = Scheduler::new(Some(4)).unwrap();
        let units = test_units(5);

        let results = scheduler.run(
            &units,
            |unit| {
                if unit.key == "unit-3" {
                    Err(UnitError::Other("always broken".into()))
                } else {
                    Ok(())
                }
            },
            None,
        );

        assert_eq!(results.len(), 5);
        assert_eq!(results.iter().filter(|r| r.is_failed()).count(), 1);
        let failed = results.iter().find(|r| r.is_failed()).unwrap();
        assert_eq!(failed.key, "unit-3");
        assert!(matches!(
            &failed.outcome,
            UnitOutcome::Failed { kind, .. } if kind == "other"
        ));
    }

    #[test]
    fn every_unit_reaches_terminal_state() {
        let scheduler = Scheduler::new(Some(2)).unwrap();
        let units = test_units(40);
        let executed = AtomicU32::new(0);

        let results = scheduler.run(
            &units,
            |_| {
                executed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            None,
        );

        // The join barrier: by the time run() returns, every worker ran
        assert_eq!(executed.load(Ordering::SeqCst), 40);
        assert_eq!(results.len(), 40);
        assert!(results.iter().all(|r| !r.is_failed()));
    }

    #[test]
    fn empty_unit_list_returns_empty_results() {
        let scheduler = Scheduler::new(Some(2)).unwrap();
        let results = scheduler.run(&[], |_| Ok(()), None);
        assert!(results.is_empty());
    }

    // =========================================================================
    // Events
    // =========================================================================

    #[test]
    fn completion_events_stream_one_per_unit() {
        let scheduler = Scheduler::new(Some(4)).unwrap();
        let units = test_units(8);
        let (tx, rx) = mpsc::channel();

        scheduler.run(
            &units,
            |unit| {
                if unit.key == "unit-2" {
                    Err(UnitError::Other("broken".into()))
                } else {
                    Ok(())
                }
            },
            Some(tx),
        );

        let events: Vec<UnitResult> = rx.iter().collect();
        assert_eq!(events.len(), 8);
        assert_eq!(events.iter().filter(|e| e.is_failed()).count(), 1);
    }

    // =========================================================================
    // Pool sizing
    // =========================================================================

    #[test]
    fn effective_workers_auto_formula() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_workers(None), (cores + 4).min(32));
    }

    #[test]
    fn effective_workers_user_constrains_down() {
        assert_eq!(effective_workers(Some(1)), 1);
    }

    #[test]
    fn effective_workers_user_cannot_exceed_ceiling() {
        let auto = effective_workers(None);
        assert_eq!(effective_workers(Some(10_000)), auto);
    }

    #[test]
    fn scheduler_reports_worker_count() {
        let scheduler = Scheduler::new(Some(3)).unwrap();
        assert_eq!(scheduler.workers(), 3);
    }
}
