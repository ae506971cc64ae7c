//! Build orchestration.
//!
//! The top-level driver for an incremental build. For each rebuild group it
//! asks the [`ChangeCache`](crate::cache::ChangeCache) whether anything
//! relevant changed, obtains the unit list from the site collaborator,
//! dispatches through the [`Scheduler`](crate::scheduler::Scheduler), and —
//! only when every unit succeeded — commits the group's categories so the
//! next run can skip them.
//!
//! # Rebuild groups
//!
//! Invalidation is coarse by category, but several categories can feed one
//! body of work: a page depends on its content file *and* the templates
//! *and* the site config. Groups capture that:
//!
//! | group | triggered by | units from |
//! |-------|--------------|------------|
//! | `static` | static | static |
//! | `pages` | content, templates, config | content |
//!
//! A group whose dispatch produced any failed unit is not committed — its
//! categories stay dirty and the next run retries the whole group. Units
//! that merely *degraded* (fallback page substituted, `.fallback` artifact
//! written) count as successes with warnings; the inputs were fully
//! processed, so committing is correct.
//!
//! # Failure policy
//!
//! Faults are recovered as close to their origin as possible: per file in
//! the cache, per unit in the worker. Only two things abort a build: an
//! invalid site configuration (a critical context — every page embeds
//! config values, so continuing would poison the whole output) and an I/O
//! failure persisting the snapshot itself. Everything else surfaces as
//! aggregate counts in the [`BuildReport`].

use std::fs;
use std::io;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::cache::{Category, CategoryStatus, ChangeCache};
use crate::config::{ConfigError, SiteConfig};
use crate::output;
use crate::recovery::{
    self, RecoveryContext, RecoveryError, RecoveryLedger, RecoveryOutcome, ResilientIo,
    WriteOutcome,
};
use crate::scheduler::{Scheduler, SchedulerError, Unit, UnitError, UnitResult};
use crate::site::{SiteData, SiteError, SiteLayout, UnitSource};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("configuration invalid: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Scheduler(#[from] SchedulerError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("unit listing failed: {0}")]
    Source(#[from] SiteError),
    #[error("critical: {operation} failed: {source}")]
    Critical {
        operation: &'static str,
        #[source]
        source: RecoveryError,
    },
}

/// File patterns tracked per category, mirrored by the site layout.
const CONTENT_PATTERNS: &[&str] = &["*.html"];
const STATIC_PATTERNS: &[&str] = &[
    "*.css", "*.js", "*.png", "*.jpg", "*.jpeg", "*.webp", "*.svg", "*.ico",
];
const TEMPLATE_PATTERNS: &[&str] = &["*.html"];

/// A body of work invalidated together.
struct RebuildGroup {
    name: &'static str,
    /// Dirtiness in any of these categories rebuilds the group.
    triggers: &'static [Category],
    /// The category whose units are dispatched.
    units_from: Category,
}

const GROUPS: [RebuildGroup; 2] = [
    RebuildGroup {
        name: "static",
        triggers: &[Category::Static],
        units_from: Category::Static,
    },
    RebuildGroup {
        name: "pages",
        triggers: &[Category::Content, Category::Templates, Category::Config],
        units_from: Category::Content,
    },
];

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub layout: SiteLayout,
    /// Rebuild everything regardless of cache state.
    pub force: bool,
}

/// Per-group dispatch result.
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub name: &'static str,
    /// False when the group was skipped as unchanged.
    pub rebuilt: bool,
    /// True when every unit succeeded and the categories were committed.
    pub committed: bool,
    pub units_total: usize,
    pub units_failed: usize,
}

/// Aggregate result of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub groups: Vec<GroupReport>,
    pub recovery: RecoveryOutcome,
    pub duration: Duration,
}

impl BuildReport {
    pub fn units_total(&self) -> usize {
        self.groups.iter().map(|g| g.units_total).sum()
    }

    pub fn units_failed(&self) -> usize {
        self.groups.iter().map(|g| g.units_failed).sum()
    }

    /// True when nothing failed outright — degraded (recovered) units still
    /// count as success, reported via the warning count.
    pub fn is_clean(&self) -> bool {
        self.units_failed() == 0 && self.recovery.failed == 0
    }
}

/// Run one incremental build.
///
/// The site collaborator is constructed from the loaded configuration and
/// structured site data via `make_source`, so callers can wire config
/// values (site name, URL) and data (rating overrides) into their renderer.
/// Per-unit completion results stream over `events` when a sender is
/// supplied.
pub fn run_build<S, F>(
    options: &BuildOptions,
    make_source: F,
    events: Option<Sender<UnitResult>>,
) -> Result<BuildReport, BuildError>
where
    S: UnitSource,
    F: FnOnce(&SiteConfig, &SiteData) -> S,
{
    let started = Instant::now();
    let ledger = RecoveryLedger::new();
    let io = ResilientIo::new(&ledger);

    // Critical context: an invalid configuration aborts the build.
    let config = RecoveryContext::new(&ledger, "build", "load site configuration")
        .run_critical(None, || {
            SiteConfig::load(&options.layout.content_dir)
                .map_err(|err| RecoveryError::Other(err.to_string()))
        })
        .map_err(|source| BuildError::Critical {
            operation: "load site configuration",
            source,
        })?;
    for warning in config.lint() {
        output::warn("config", &warning);
    }

    // Structured data degrades, never aborts: a corrupt ratings file is
    // backed up and replaced by the empty default. The file is optional,
    // so its absence is not even worth a warning.
    let ratings_path = options.layout.content_dir.join("ratings.json");
    let rating_overrides = if ratings_path.exists() {
        io.load_json_or_default("build", &ratings_path, Default::default())
            .0
    } else {
        Default::default()
    };
    let data = SiteData { rating_overrides };

    let source = make_source(&config, &data);
    fs::create_dir_all(&options.layout.output_dir)?;

    let mut cache = ChangeCache::load(&options.layout.output_dir);
    register_tracked_files(&mut cache, &options.layout);

    let scheduler = Scheduler::new(config.build.max_workers)?;

    let site_name = config.site.name.clone();
    let worker = |unit: &Unit| -> Result<(), UnitError> {
        let fallback_html = recovery::fallback_page(
            &site_name,
            &format!("The page '{}' could not be generated.", unit.key),
        );
        // Each unit renders against its own context copy inside the
        // collaborator; the only state shared here is the ledger.
        let rendered = io.render_guarded(
            "build",
            &format!("render {}", unit.key),
            fallback_html.clone().into_bytes(),
            || source.render(unit),
        );
        match io.write_with_retry(
            "build",
            &unit.output_path,
            &rendered.into_value(),
            Some(&fallback_html),
        ) {
            WriteOutcome::Written | WriteOutcome::Recovered { .. } => Ok(()),
            WriteOutcome::Failed(err) => Err(UnitError::Write(err)),
        }
    };

    let mut groups = Vec::new();
    for group in &GROUPS {
        let dirty = group
            .triggers
            .iter()
            .any(|&category| cache.has_changes(category, options.force));
        if !dirty {
            output::note("build", &format!("skipping {} - no changes detected", group.name));
            groups.push(GroupReport {
                name: group.name,
                rebuilt: false,
                committed: false,
                units_total: 0,
                units_failed: 0,
            });
            continue;
        }

        let units = source.units(group.units_from)?;
        output::note(
            "build",
            &format!(
                "rebuilding {} ({} units across {} workers)",
                group.name,
                units.len(),
                scheduler.workers()
            ),
        );

        let results = scheduler.run(&units, &worker, events.clone());
        let units_failed = results.iter().filter(|r| r.is_failed()).count();

        let committed = units_failed == 0;
        if committed {
            for &category in group.triggers {
                cache.commit(category);
            }
        } else {
            output::warn(
                "build",
                &format!(
                    "{}: {units_failed} unit(s) failed; group remains dirty for the next run",
                    group.name
                ),
            );
        }

        groups.push(GroupReport {
            name: group.name,
            rebuilt: true,
            committed,
            units_total: units.len(),
            units_failed,
        });
    }

    cache.save()?;
    if let Some(path) = ledger.write_summary(&options.layout.output_dir)? {
        output::note("build", &format!("error summary saved to {}", path.display()));
    }

    Ok(BuildReport {
        groups,
        recovery: ledger.snapshot(),
        duration: started.elapsed(),
    })
}

/// Per-category tracked/dirty view without building — the `status` command.
pub fn site_status(layout: &SiteLayout) -> Vec<CategoryStatus> {
    let mut cache = ChangeCache::load(&layout.output_dir);
    register_tracked_files(&mut cache, layout);
    cache.status()
}

/// Register every tracked input file with the cache, one scan per category.
fn register_tracked_files(cache: &mut ChangeCache, layout: &SiteLayout) {
    cache.scan(&layout.content_dir, CONTENT_PATTERNS, Category::Content);
    cache.scan(&layout.static_dir, STATIC_PATTERNS, Category::Static);
    cache.scan(&layout.templates_dir, TEMPLATE_PATTERNS, Category::Templates);
    cache.track_files(
        &[
            layout.content_dir.join("site.toml"),
            layout.content_dir.join("ratings.json"),
        ],
        Category::Config,
    );
}
