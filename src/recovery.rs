//! Fault containment and degraded-mode I/O.
//!
//! A site build touches hundreds of files, and any one of them can be
//! unreadable, unwritable, or malformed. This module keeps those faults
//! local: a bad input degrades the one artifact it belongs to, never the
//! whole run.
//!
//! # Design
//!
//! [`RecoveryContext`] is the single fault boundary everything else is built
//! from. It is deliberately *not* exception-shaped: running an operation
//! returns an explicit [`Recovered`] value that callers branch on, and
//! criticality is expressed by which method you call — [`RecoveryContext::run`]
//! suppresses the failure and hands back the fallback value, while
//! [`RecoveryContext::run_critical`] logs, attempts recovery, and then
//! propagates. There is no hidden control flow to audit.
//!
//! [`ResilientIo`] layers the three operation shapes the pipeline needs on
//! top of that boundary:
//!
//! - **retryable write** — bounded retries with remediation between
//!   attempts, degrading to a `<path>.fallback` artifact
//! - **guarded render** — substitute a fallback document when a renderer
//!   fails
//! - **guarded JSON load** — substitute a caller-supplied default when a
//!   data file is missing or malformed, preserving the bad file as
//!   `<path>.backup`
//!
//! All outcomes are tallied in a [`RecoveryLedger`] constructed once per
//! build and passed by reference — there is no process-global handler. When
//! a build saw at least one error, the ledger's summary is persisted to
//! `build-errors.json` in the output directory.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::output;

/// Upper bound on write attempts, remediation between each.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Name of the persisted error summary within the output directory.
const SUMMARY_FILENAME: &str = "build-errors.json";

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("render failed: {0}")]
    Render(String),
    #[error("{0}")]
    Other(String),
}

impl RecoveryError {
    /// Short failure-kind label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            RecoveryError::Io(err) => match err.kind() {
                io::ErrorKind::NotFound => "not-found",
                io::ErrorKind::PermissionDenied => "permission-denied",
                _ => "io",
            },
            RecoveryError::Json(_) => "json",
            RecoveryError::Render(_) => "render",
            RecoveryError::Other(_) => "other",
        }
    }
}

// ============================================================================
// Outcome ledger
// ============================================================================

/// Aggregated outcome counters for one build invocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// Guarded operations entered.
    pub attempted: u32,
    /// Operations that completed without error.
    pub succeeded: u32,
    /// Operations that raised an error (counted once per operation, not per
    /// retry).
    pub errors: u32,
    /// Failures degraded to a fallback value or artifact.
    pub recovered: u32,
    /// Failures with no well-handled recovery shape.
    pub failed: u32,
    /// Failures propagated from a critical context.
    pub critical: u32,
}

/// Persisted summary shape — see `build-errors.json`.
#[derive(Serialize)]
struct Summary {
    total: u32,
    recovered: u32,
    failed: u32,
    critical: u32,
}

/// Thread-shared outcome counters, constructed once per build.
///
/// The lock is held only for the duration of a single counter update, never
/// across I/O. Disposition counts (`recovered`/`failed`) are recorded by the
/// operation that owns the fallback, since only it knows whether the
/// substitution was a well-handled shape.
#[derive(Debug, Default)]
pub struct RecoveryLedger {
    counters: Mutex<RecoveryOutcome>,
}

impl RecoveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the counters as of now.
    pub fn snapshot(&self) -> RecoveryOutcome {
        *self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with(&self, update: impl FnOnce(&mut RecoveryOutcome)) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        update(&mut counters);
    }

    pub fn mark_recovered(&self) {
        self.with(|c| c.recovered += 1);
    }

    pub fn mark_failed(&self) {
        self.with(|c| c.failed += 1);
    }

    /// Persist the `{total, recovered, failed, critical}` summary to the
    /// output directory. Written only when at least one error occurred;
    /// returns the path when a file was written.
    pub fn write_summary(&self, output_dir: &Path) -> io::Result<Option<PathBuf>> {
        let counters = self.snapshot();
        if counters.errors == 0 && counters.critical == 0 {
            return Ok(None);
        }
        let summary = Summary {
            total: counters.errors,
            recovered: counters.recovered,
            failed: counters.failed,
            critical: counters.critical,
        };
        fs::create_dir_all(output_dir)?;
        let path = output_dir.join(SUMMARY_FILENAME);
        fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
        Ok(Some(path))
    }
}

// ============================================================================
// RecoveryContext
// ============================================================================

/// How a guarded operation concluded.
#[derive(Debug)]
pub enum Recovered<T> {
    /// The operation completed normally.
    Clean(T),
    /// The operation failed; the fallback value was substituted.
    Fallback { value: T, error: RecoveryError },
}

impl<T> Recovered<T> {
    pub fn is_clean(&self) -> bool {
        matches!(self, Recovered::Clean(_))
    }

    /// Unwrap to the carried value, clean or fallback.
    pub fn into_value(self) -> T {
        match self {
            Recovered::Clean(value) => value,
            Recovered::Fallback { value, .. } => value,
        }
    }
}

/// A scoped fault boundary around one fallible operation.
///
/// Construction names the operation and the owning component for log lines;
/// running it records the outcome in the ledger. An optional recovery action
/// is invoked on failure, and its own success or failure is logged.
pub struct RecoveryContext<'a> {
    ledger: &'a RecoveryLedger,
    component: &'static str,
    operation: String,
}

impl<'a> RecoveryContext<'a> {
    pub fn new(
        ledger: &'a RecoveryLedger,
        component: &'static str,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            component,
            operation: operation.into(),
        }
    }

    /// Run `op`, suppressing failure: on error the fallback value is
    /// substituted and the error travels inside the returned [`Recovered`]
    /// for the caller to branch on. Execution always continues.
    pub fn run<T>(
        &self,
        fallback: T,
        recovery: Option<&dyn Fn() -> Result<(), RecoveryError>>,
        op: impl FnOnce() -> Result<T, RecoveryError>,
    ) -> Recovered<T> {
        match self.enter(recovery, op) {
            Ok(value) => Recovered::Clean(value),
            Err(error) => Recovered::Fallback {
                value: fallback,
                error,
            },
        }
    }

    /// Run `op` in a critical scope: failure is logged and recovery is
    /// attempted exactly as in [`run`](Self::run), but the original error
    /// then propagates so the build terminates.
    pub fn run_critical<T>(
        &self,
        recovery: Option<&dyn Fn() -> Result<(), RecoveryError>>,
        op: impl FnOnce() -> Result<T, RecoveryError>,
    ) -> Result<T, RecoveryError> {
        let result = self.enter(recovery, op);
        if result.is_err() {
            self.ledger.with(|c| c.critical += 1);
        }
        result
    }

    fn enter<T>(
        &self,
        recovery: Option<&dyn Fn() -> Result<(), RecoveryError>>,
        op: impl FnOnce() -> Result<T, RecoveryError>,
    ) -> Result<T, RecoveryError> {
        self.ledger.with(|c| c.attempted += 1);
        match op() {
            Ok(value) => {
                self.ledger.with(|c| c.succeeded += 1);
                Ok(value)
            }
            Err(error) => {
                self.ledger.with(|c| c.errors += 1);
                output::warn(
                    self.component,
                    &format!("{} failed: {}: {error}", self.operation, error.kind()),
                );
                if let Some(action) = recovery {
                    match action() {
                        Ok(()) => output::note(
                            self.component,
                            &format!("recovery succeeded for {}", self.operation),
                        ),
                        Err(recovery_error) => output::warn(
                            self.component,
                            &format!("recovery failed for {}: {recovery_error}", self.operation),
                        ),
                    }
                }
                Err(error)
            }
        }
    }
}

// ============================================================================
// ResilientIo
// ============================================================================

/// Outcome of a retryable write.
#[derive(Debug)]
pub enum WriteOutcome {
    /// Write landed on the target path.
    Written,
    /// Retries exhausted; a fallback artifact was written instead.
    Recovered { fallback_path: PathBuf },
    /// The write failed and no fallback artifact could be produced.
    Failed(RecoveryError),
}

impl WriteOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, WriteOutcome::Failed(_))
    }
}

/// Outcome of a guarded structured-data load.
#[derive(Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    /// Missing file; default substituted (recovered).
    MissingDefault,
    /// Malformed content; default substituted, bad file preserved as
    /// `<path>.backup` when the copy succeeded (recovered).
    CorruptDefault { backup: Option<PathBuf> },
    /// Unclassified failure; default substituted (failed).
    Failed,
}

/// Degraded-mode file operations, all recorded in one shared ledger.
pub struct ResilientIo<'a> {
    ledger: &'a RecoveryLedger,
}

impl<'a> ResilientIo<'a> {
    pub fn new(ledger: &'a RecoveryLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &'a RecoveryLedger {
        self.ledger
    }

    /// Write `content` to `path` with up to [`MAX_WRITE_ATTEMPTS`] attempts.
    ///
    /// Remediation between attempts depends on the failure kind: permission
    /// denied relaxes the target's file mode; a missing path creates parent
    /// directories. Any other error kind aborts immediately. When retries
    /// are exhausted and `fallback` content was supplied, it is written to
    /// `<path>.fallback` and the outcome counts as recovered.
    pub fn write_with_retry(
        &self,
        component: &'static str,
        path: &Path,
        content: &[u8],
        fallback: Option<&str>,
    ) -> WriteOutcome {
        self.write_with_retry_using(component, path, content, fallback, &mut |p, c| {
            fs::write(p, c)
        })
    }

    /// Retryable write with an injectable write primitive, so retry and
    /// remediation behavior is testable without real filesystem faults.
    pub(crate) fn write_with_retry_using(
        &self,
        component: &'static str,
        path: &Path,
        content: &[u8],
        fallback: Option<&str>,
        writer: &mut dyn FnMut(&Path, &[u8]) -> io::Result<()>,
    ) -> WriteOutcome {
        let ctx = RecoveryContext::new(self.ledger, component, format!("write {}", path.display()));

        let attempts = || -> Result<(), RecoveryError> {
            let mut last_error: Option<io::Error> = None;
            for attempt in 1..=MAX_WRITE_ATTEMPTS {
                match writer(path, content) {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        match err.kind() {
                            io::ErrorKind::PermissionDenied => {
                                output::warn(
                                    component,
                                    &format!(
                                        "permission denied on {}, attempt {attempt}/{MAX_WRITE_ATTEMPTS}",
                                        path.display()
                                    ),
                                );
                                relax_mode(path);
                            }
                            io::ErrorKind::NotFound => {
                                if let Some(parent) = path.parent() {
                                    let _ = fs::create_dir_all(parent);
                                }
                            }
                            // Not a known-transient shape: no retry.
                            _ => return Err(err.into()),
                        }
                        last_error = Some(err);
                    }
                }
            }
            Err(RecoveryError::Io(last_error.unwrap_or_else(|| {
                io::Error::other("write retries exhausted")
            })))
        };

        match ctx.run((), None, attempts) {
            Recovered::Clean(()) => WriteOutcome::Written,
            Recovered::Fallback { error, .. } => {
                let retryable = matches!(error.kind(), "permission-denied" | "not-found");
                if retryable && let Some(fb_content) = fallback {
                    let fb_path = fallback_path(path);
                    match fs::write(&fb_path, fb_content) {
                        Ok(()) => {
                            output::note(
                                component,
                                &format!("created fallback file: {}", fb_path.display()),
                            );
                            self.ledger.mark_recovered();
                            return WriteOutcome::Recovered { fallback_path: fb_path };
                        }
                        Err(fb_err) => output::warn(
                            component,
                            &format!("fallback write failed: {fb_err}"),
                        ),
                    }
                }
                self.ledger.mark_failed();
                WriteOutcome::Failed(error)
            }
        }
    }

    /// Call a render function, substituting `fallback` output on failure.
    /// A substituted render counts as recovered — the page exists, just in
    /// degraded form.
    pub fn render_guarded<T>(
        &self,
        component: &'static str,
        operation: &str,
        fallback: T,
        render: impl FnOnce() -> Result<T, RecoveryError>,
    ) -> Recovered<T> {
        let ctx = RecoveryContext::new(self.ledger, component, operation);
        let outcome = ctx.run(fallback, None, render);
        if !outcome.is_clean() {
            self.ledger.mark_recovered();
        }
        outcome
    }

    /// Read and parse a JSON file, substituting `default` when it cannot be
    /// used. A missing file or malformed content is a well-handled shape
    /// (recovered); anything else counts as failed. Malformed files are
    /// preserved as `<path>.backup` on a best-effort basis.
    ///
    /// A missing file is expected (data files are optional) and records
    /// recovered without an error, so it never triggers the error summary.
    pub fn load_json_or_default<T: DeserializeOwned>(
        &self,
        component: &'static str,
        path: &Path,
        default: T,
    ) -> (T, LoadStatus) {
        if !path.exists() {
            output::warn(
                component,
                &format!("data file not found: {}, using default", path.display()),
            );
            self.ledger.with(|c| {
                c.attempted += 1;
                c.recovered += 1;
            });
            return (default, LoadStatus::MissingDefault);
        }

        let ctx = RecoveryContext::new(self.ledger, component, format!("load {}", path.display()));

        let load = || -> Result<T, RecoveryError> {
            let raw = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        };

        match ctx.run(default, None, load) {
            Recovered::Clean(value) => (value, LoadStatus::Loaded),
            Recovered::Fallback { value, error } => match &error {
                RecoveryError::Io(err) if err.kind() == io::ErrorKind::NotFound => {
                    self.ledger.mark_recovered();
                    (value, LoadStatus::MissingDefault)
                }
                RecoveryError::Json(_) => {
                    let candidate = backup_path(path);
                    let backup = fs::copy(path, &candidate).ok().map(|_| candidate);
                    if let Some(backup) = &backup {
                        output::note(
                            component,
                            &format!("created backup: {}", backup.display()),
                        );
                    }
                    self.ledger.mark_recovered();
                    (value, LoadStatus::CorruptDefault { backup })
                }
                _ => {
                    self.ledger.mark_failed();
                    (value, LoadStatus::Failed)
                }
            },
        }
    }
}

/// Minimal human-readable substitute for a page that could not be produced.
pub fn fallback_page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head><meta charset=\"UTF-8\"><title>{title}</title></head>\n\
         <body>\n\
         <h1>{title}</h1>\n\
         <p>{message}</p>\n\
         <a href=\"/\">Go Home</a>\n\
         </body>\n\
         </html>\n"
    )
}

/// Sibling path carrying the `.fallback` suffix.
fn fallback_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".fallback");
    PathBuf::from(os)
}

/// Sibling path carrying the `.backup` suffix.
fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".backup");
    PathBuf::from(os)
}

/// Relax a file's mode so a retried write can land. Best effort.
fn relax_mode(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o644));
    }
    #[cfg(not(unix))]
    let _ = path;
}
