//! CLI output formatting for the build pipeline.
//!
//! Each report has a `format_*` function (returns `String`/`Vec<String>`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure — no I/O, no side effects. Warnings go to stderr so
//! piped output stays clean.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! ==> Building site -> dist
//! build: rebuilding pages (8 units across 12 workers)
//!   index: ok
//!   about-us: ok
//!   snake: FAILED (write: IO error: ...)
//! pages: 8 units, 1 failed (remains dirty)
//! static: skipped (no changes)
//! Build finished in 0.31s: 7 units ok, 1 failed, 2 warnings
//! ```
//!
//! ## Status
//!
//! ```text
//! Categories
//!   content      12 tracked  dirty
//!   static       34 tracked  clean
//!   templates     3 tracked  clean
//!   config        1 tracked  clean
//! ```

use crate::build::BuildReport;
use crate::cache::CategoryStatus;
use crate::scheduler::{UnitOutcome, UnitResult};

// ============================================================================
// Log lines
// ============================================================================

pub fn format_warn(component: &str, message: &str) -> String {
    format!("warning: {component}: {message}")
}

pub fn format_note(component: &str, message: &str) -> String {
    format!("{component}: {message}")
}

/// Print a warning line to stderr.
pub fn warn(component: &str, message: &str) {
    eprintln!("{}", format_warn(component, message));
}

/// Print an informational line to stdout.
pub fn note(component: &str, message: &str) {
    println!("{}", format_note(component, message));
}

// ============================================================================
// Unit results
// ============================================================================

/// One line per completed unit, indented under the group header.
pub fn format_unit_result(result: &UnitResult) -> String {
    match &result.outcome {
        UnitOutcome::Success => format!("  {}: ok", result.key),
        UnitOutcome::Failed { kind, message } => {
            format!("  {}: FAILED ({kind}: {message})", result.key)
        }
    }
}

// ============================================================================
// Category status
// ============================================================================

pub fn format_category_status(statuses: &[CategoryStatus]) -> Vec<String> {
    let mut lines = vec!["Categories".to_string()];
    for status in statuses {
        lines.push(format!(
            "  {:<12} {:>3} tracked  {}",
            status.category,
            status.tracked,
            if status.dirty { "dirty" } else { "clean" }
        ));
    }
    lines
}

pub fn print_category_status(statuses: &[CategoryStatus]) {
    for line in format_category_status(statuses) {
        println!("{line}");
    }
}

// ============================================================================
// Build summary
// ============================================================================

pub fn format_build_summary(report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();

    for group in &report.groups {
        if !group.rebuilt {
            lines.push(format!("{}: skipped (no changes)", group.name));
        } else if group.committed {
            lines.push(format!(
                "{}: {} units, committed",
                group.name, group.units_total
            ));
        } else {
            lines.push(format!(
                "{}: {} units, {} failed (remains dirty)",
                group.name, group.units_total, group.units_failed
            ));
        }
    }

    let recovery = &report.recovery;
    if recovery.errors > 0 || recovery.critical > 0 {
        lines.push(format!(
            "recovery: {} errors, {} recovered, {} failed",
            recovery.errors, recovery.recovered, recovery.failed
        ));
    }

    let ok = report.units_total() - report.units_failed();
    let mut tail = format!(
        "Build finished in {:.2}s: {} units ok",
        report.duration.as_secs_f64(),
        ok
    );
    if report.units_failed() > 0 {
        tail.push_str(&format!(", {} failed", report.units_failed()));
    }
    if recovery.recovered > 0 {
        tail.push_str(&format!(", {} warnings", recovery.recovered));
    }
    lines.push(tail);

    lines
}

pub fn print_build_summary(report: &BuildReport) {
    for line in format_build_summary(report) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::GroupReport;
    use crate::cache::Category;
    use crate::recovery::RecoveryOutcome;
    use std::time::Duration;

    fn sample_report() -> BuildReport {
        BuildReport {
            groups: vec![
                GroupReport {
                    name: "static",
                    rebuilt: false,
                    committed: false,
                    units_total: 0,
                    units_failed: 0,
                },
                GroupReport {
                    name: "pages",
                    rebuilt: true,
                    committed: false,
                    units_total: 8,
                    units_failed: 1,
                },
            ],
            recovery: RecoveryOutcome {
                attempted: 9,
                succeeded: 7,
                errors: 2,
                recovered: 1,
                failed: 1,
                critical: 0,
            },
            duration: Duration::from_millis(310),
        }
    }

    #[test]
    fn unit_result_lines() {
        let ok = UnitResult {
            key: "index".into(),
            outcome: UnitOutcome::Success,
        };
        assert_eq!(format_unit_result(&ok), "  index: ok");

        let failed = UnitResult {
            key: "snake".into(),
            outcome: UnitOutcome::Failed {
                kind: "write".into(),
                message: "boom".into(),
            },
        };
        assert_eq!(format_unit_result(&failed), "  snake: FAILED (write: boom)");
    }

    #[test]
    fn category_status_lines() {
        let lines = format_category_status(&[
            CategoryStatus {
                category: Category::Content,
                tracked: 12,
                dirty: true,
            },
            CategoryStatus {
                category: Category::Static,
                tracked: 3,
                dirty: false,
            },
        ]);
        assert_eq!(lines[0], "Categories");
        assert!(lines[1].contains("content"));
        assert!(lines[1].ends_with("dirty"));
        assert!(lines[2].ends_with("clean"));
    }

    #[test]
    fn build_summary_covers_groups_and_recovery() {
        let lines = format_build_summary(&sample_report());
        assert_eq!(lines[0], "static: skipped (no changes)");
        assert_eq!(lines[1], "pages: 8 units, 1 failed (remains dirty)");
        assert_eq!(lines[2], "recovery: 2 errors, 1 recovered, 1 failed");
        assert!(lines[3].starts_with("Build finished in 0.31s: 7 units ok"));
        assert!(lines[3].contains("1 failed"));
        assert!(lines[3].contains("1 warnings"));
    }

    #[test]
    fn build_summary_clean_run_has_no_recovery_line() {
        let report = BuildReport {
            groups: vec![GroupReport {
                name: "pages",
                rebuilt: true,
                committed: true,
                units_total: 4,
                units_failed: 0,
            }],
            recovery: RecoveryOutcome::default(),
            duration: Duration::from_millis(120),
        };
        let lines = format_build_summary(&report);
        assert_eq!(lines[0], "pages: 4 units, committed");
        assert!(!lines.iter().any(|l| l.starts_with("recovery:")));
    }

    #[test]
    fn warn_and_note_lines() {
        assert_eq!(format_warn("cache", "bad file"), "warning: cache: bad file");
        assert_eq!(format_note("build", "done"), "build: done");
    }
}
