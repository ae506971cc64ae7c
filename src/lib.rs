//! # Arcade Forge
//!
//! An incremental static site builder for web game portals. Your content
//! directory is the data source: per-page HTML files become pages, static
//! assets are copied through, and everything is regenerated only when its
//! inputs actually changed.
//!
//! # Architecture: Change-Driven Pipeline
//!
//! Every build runs the same four steps; the cache decides how much of the
//! work actually happens:
//!
//! ```text
//! 1. Fingerprint   content/ static/ templates/  →  per-category dirtiness
//! 2. Plan          dirty categories              →  rebuild groups
//! 3. Dispatch      units                         →  worker pool fan-out
//! 4. Commit        clean groups                  →  .build-cache.json
//! ```
//!
//! This shape exists for three reasons:
//!
//! - **Fast rebuilds**: an unchanged category costs one fingerprint pass,
//!   not a regeneration. A no-op build finishes in milliseconds.
//! - **Fault containment**: one bad page degrades one artifact. Failures
//!   are caught per file in the cache and per unit in the worker; the run
//!   always finishes and reports aggregate counts.
//! - **Honest caching**: a group is committed only after every one of its
//!   units succeeded, so a partially failed build is retried in full next
//!   time rather than silently considered done.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`cache`] | Content fingerprints, per-category change detection, snapshot persistence |
//! | [`scheduler`] | Fixed-size worker pool: fan-out, per-unit fault isolation, join barrier |
//! | [`recovery`] | Scoped fault boundaries, retryable writes, fallback substitution, outcome ledger |
//! | [`build`] | The orchestrator: rebuild groups, commit policy, build report |
//! | [`site`] | Filesystem-backed collaborators: page/asset units, injected renderer |
//! | [`config`] | `site.toml` loading and validation |
//! | [`output`] | CLI output formatting — pure format functions + print wrappers |
//!
//! # Design Decisions
//!
//! ## Category-Level Invalidation
//!
//! Change detection is per *category* (content, static, templates, config),
//! not per file. Modifying one page rebuilds all pages. That sounds
//! wasteful, but page generation is cheap next to the correctness cost of
//! tracking cross-page dependencies (navigation, shared templates, config
//! values embedded everywhere); the coarse decision makes "is the output
//! consistent with the inputs" a one-bit question per category.
//!
//! ## Explicit Recovery Results
//!
//! Fault handling never travels as unwound panics or hidden control flow.
//! A guarded operation returns a [`recovery::Recovered`] value the caller
//! branches on, and criticality is visible at the call site
//! ([`recovery::RecoveryContext::run_critical`]). The one per-build
//! [`recovery::RecoveryLedger`] is passed by reference wherever it is
//! needed — there is no global error handler.
//!
//! ## Dedicated Worker Pool
//!
//! Each build constructs its own rayon pool sized `min(32, cores + 4)` —
//! workers block on file I/O, so oversubscribing the cores slightly keeps
//! them busy. The pool is never the global one, and the only shared state
//! workers touch is the outcome ledger (a mutex held per counter update)
//! and the completion-event channel.
//!
//! ## Renderer as a Seam
//!
//! The core never parses or templates HTML. Pages are produced by a
//! [`site::PageRenderer`] closure injected at the edge; the stock CLI wires
//! in a bare document shell. Swapping in a real template engine touches
//! exactly one constructor argument.

pub mod build;
pub mod cache;
pub mod config;
pub mod output;
pub mod recovery;
pub mod scheduler;
pub mod site;
