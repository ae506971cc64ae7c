//! Change cache for incremental builds.
//!
//! Re-rendering every page and re-copying every asset on each invocation is
//! the bottleneck of the build pipeline once a site grows past a handful of
//! games. This module lets the orchestrator skip whole categories of work
//! when their inputs haven't changed since the last successful build.
//!
//! # Design
//!
//! Tracked files are grouped into fixed [`Category`] buckets (content,
//! static, templates, config). Each category carries exactly one
//! invalidation decision: if *any* file in the bucket was added, removed, or
//! modified, the whole bucket is dirty and all of its work is redone.
//! Finer-grained per-file invalidation is deliberately out of scope — the
//! coarse decision keeps commit semantics trivial to reason about (a bucket
//! is either fully consistent with its inputs or it is not).
//!
//! ## Fingerprints
//!
//! A file's observed state is its SHA-256 content hash plus size plus
//! modification time. Two fingerprints are equal only when all three match.
//! Content hashing rather than mtime alone means a `git checkout` (which
//! rewrites mtimes) does not force a full rebuild by itself; the mtime and
//! size components catch truncation and in-place edits cheaply.
//!
//! Fingerprint computation is pure: identical bytes and metadata always
//! produce the identical [`FileRecord`].
//!
//! ## Failure semantics
//!
//! Any I/O failure while fingerprinting a single path is caught locally,
//! logged, and the path is treated as **changed**. The cache fails open
//! toward rebuilding — it may do unnecessary work but never silently skips
//! a real change.
//!
//! ## Storage
//!
//! The snapshot is a JSON file at `<output_dir>/.build-cache.json`, written
//! once at the end of a build via a temp-file-and-rename so a crash mid-save
//! never leaves a truncated snapshot behind. A missing, corrupt, or
//! version-mismatched snapshot loads as empty, which degrades to a full
//! rebuild rather than an error.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::output;

/// Name of the snapshot file within the output directory.
const SNAPSHOT_FILENAME: &str = ".build-cache.json";

/// Version of the snapshot format. Bump this to invalidate all existing
/// snapshots when the format or fingerprint computation changes.
const SNAPSHOT_VERSION: u32 = 1;

/// A named group of tracked files sharing one invalidation decision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Per-page HTML content files.
    Content,
    /// Static assets: stylesheets, scripts, images, icons.
    Static,
    /// Page templates.
    Templates,
    /// Site configuration files.
    Config,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Content,
        Category::Static,
        Category::Templates,
        Category::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Content => "content",
            Category::Static => "static",
            Category::Templates => "templates",
            Category::Config => "config",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single tracked file's observed state.
///
/// Equality (no change) requires hash, size, and mtime to all match the
/// previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub hash: String,
    pub size: u64,
    pub mtime: f64,
}

/// The full `category → {path → FileRecord}` mapping persisted between
/// builds, plus the schema version tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    categories: BTreeMap<Category, BTreeMap<String, FileRecord>>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            categories: BTreeMap::new(),
        }
    }
}

/// Per-category view for status reporting.
#[derive(Debug, Clone)]
pub struct CategoryStatus {
    pub category: Category,
    pub tracked: usize,
    pub dirty: bool,
}

/// Owns the committed fingerprint snapshot and the set of paths registered
/// during this invocation; answers "has this category changed since the last
/// committed build".
#[derive(Debug)]
pub struct ChangeCache {
    snapshot_path: PathBuf,
    committed: Snapshot,
    registered: BTreeMap<Category, BTreeSet<PathBuf>>,
}

impl ChangeCache {
    /// Load the snapshot from the output directory. A missing or unreadable
    /// snapshot (corruption, version mismatch) yields an empty cache —
    /// equivalent to "everything is new".
    pub fn load(output_dir: &Path) -> Self {
        let snapshot_path = output_dir.join(SNAPSHOT_FILENAME);
        let committed = match fs::read_to_string(&snapshot_path) {
            Ok(raw) => match serde_json::from_str::<Snapshot>(&raw) {
                Ok(snap) if snap.version == SNAPSHOT_VERSION => snap,
                _ => Snapshot::empty(),
            },
            Err(_) => Snapshot::empty(),
        };
        Self {
            snapshot_path,
            committed,
            registered: BTreeMap::new(),
        }
    }

    /// Enumerate files under `root` matching any of `patterns` (shell-style
    /// `*.ext` globs or exact file names) and register them against
    /// `category`. No fingerprint comparison happens here. A nonexistent
    /// root yields an empty list, not an error.
    pub fn scan(&mut self, root: &Path, patterns: &[&str], category: Category) -> Vec<PathBuf> {
        if !root.exists() {
            return Vec::new();
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if patterns.iter().any(|p| pattern_matches(p, &name)) {
                found.push(entry.into_path());
            }
        }
        found.sort();

        self.registered
            .entry(category)
            .or_default()
            .extend(found.iter().cloned());
        found
    }

    /// Register explicit paths (e.g. config files) against a category.
    /// Paths that don't exist are skipped — registering them would pin the
    /// category dirty forever, since they could never be fingerprinted.
    pub fn track_files(&mut self, paths: &[PathBuf], category: Category) {
        let bucket = self.registered.entry(category).or_default();
        for path in paths {
            if path.is_file() {
                bucket.insert(path.clone());
            }
        }
    }

    /// Number of paths registered under a category this invocation.
    pub fn tracked(&self, category: Category) -> usize {
        self.registered.get(&category).map_or(0, BTreeSet::len)
    }

    /// Has anything in `category` changed since the last committed build?
    ///
    /// `force` always answers true without comparing. Otherwise the check is
    /// true on any fingerprint mismatch, any registered path missing from
    /// the snapshot (added), or any snapshot path no longer registered or on
    /// disk (removed). Categories are independent: this never consults any
    /// other category's state.
    pub fn has_changes(&self, category: Category, force: bool) -> bool {
        if force {
            return true;
        }

        static EMPTY: BTreeMap<String, FileRecord> = BTreeMap::new();
        let snapshot = self.committed.categories.get(&category).unwrap_or(&EMPTY);
        let registered = self.registered.get(&category);

        if let Some(paths) = registered {
            for path in paths {
                let key = snapshot_key(path);
                match fingerprint(path) {
                    Ok(current) => match snapshot.get(&key) {
                        Some(previous) if *previous == current => {}
                        // Added or modified
                        _ => return true,
                    },
                    Err(err) => {
                        // Fail open: an unreadable file must trigger a
                        // rebuild, never a silent skip.
                        output::warn(
                            "cache",
                            &format!("cannot fingerprint {}: {err}", path.display()),
                        );
                        return true;
                    }
                }
            }
        }

        // Removed: present in the snapshot, no longer registered.
        let current_keys: BTreeSet<String> = registered
            .map(|paths| paths.iter().map(|p| snapshot_key(p)).collect())
            .unwrap_or_default();
        snapshot.keys().any(|key| !current_keys.contains(key))
    }

    /// Recompute and store fingerprints for every path registered under
    /// `category`, replacing that category's portion of the in-memory
    /// snapshot. Call only once the category's outputs are known to reflect
    /// its inputs. Paths that fail to fingerprint are omitted — they read as
    /// "new" on the next run and trigger a rebuild.
    pub fn commit(&mut self, category: Category) {
        let mut records = BTreeMap::new();
        if let Some(paths) = self.registered.get(&category) {
            for path in paths {
                match fingerprint(path) {
                    Ok(record) => {
                        records.insert(snapshot_key(path), record);
                    }
                    Err(err) => {
                        output::warn(
                            "cache",
                            &format!("skipping {} in snapshot: {err}", path.display()),
                        );
                    }
                }
            }
        }
        self.committed.categories.insert(category, records);
    }

    /// Persist the snapshot. Writes a sibling temp file then renames over
    /// the target so readers never observe a partial snapshot.
    pub fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.committed)?;
        let tmp = self.snapshot_path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.snapshot_path)
    }

    /// Per-category tracked counts and dirtiness, for the `status` command
    /// and build output.
    pub fn status(&self) -> Vec<CategoryStatus> {
        Category::ALL
            .iter()
            .map(|&category| CategoryStatus {
                category,
                tracked: self.tracked(category),
                dirty: self.has_changes(category, false),
            })
            .collect()
    }

    /// Number of committed snapshot entries for a category (test and status
    /// introspection).
    pub fn committed_len(&self, category: Category) -> usize {
        self.committed
            .categories
            .get(&category)
            .map_or(0, BTreeMap::len)
    }
}

/// Compute a file's fingerprint: SHA-256 content hash + size + mtime.
pub fn fingerprint(path: &Path) -> io::Result<FileRecord> {
    let bytes = fs::read(path)?;
    let metadata = fs::metadata(path)?;
    let mtime = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(FileRecord {
        hash: format!("{:x}", Sha256::digest(&bytes)),
        size: metadata.len(),
        mtime,
    })
}

/// Snapshot map key for a path.
fn snapshot_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Match a file name against a `*.ext`-style glob or an exact name.
/// Extension matching is case-insensitive (`Logo.PNG` matches `*.png`).
fn pattern_matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) => name.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase()),
        None => name == pattern,
    }
}
