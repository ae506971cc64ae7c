//! Filesystem-backed site collaborators.
//!
//! The build core never renders HTML or parses metadata itself — it asks a
//! [`UnitSource`] for the units a category needs and for each unit's output
//! bytes. This module provides the stock source used by the CLI: pages come
//! from per-page HTML content files, static assets are copied through
//! verbatim, and the actual page markup is produced by an injected renderer
//! closure. Swapping in a real template engine means swapping that closure,
//! nothing else.
//!
//! # Content layout
//!
//! ```text
//! content/
//! ├── site.toml            # Site config (tracked under the config category)
//! ├── index.html           # Page body → dist/index.html
//! ├── about-us.html        # Page body → dist/about-us/index.html
//! └── snake.html           # Page body → dist/snake/index.html
//! static/
//! ├── css/styles.css       # Copied → dist/css/styles.css
//! └── img/hero.png         # Copied → dist/img/hero.png
//! ```
//!
//! Pages get clean URLs: every slug except `index` lands at
//! `<slug>/index.html`. A page whose content file disappears between scan
//! and render still produces a page, with a placeholder body.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::cache::Category;
use crate::recovery::RecoveryError;
use crate::scheduler::Unit;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces the units a category needs and each unit's output bytes.
///
/// This is the narrow seam between the build core and everything it
/// considers external: templating, metadata extraction, asset handling.
pub trait UnitSource: Sync {
    /// The units to (re)generate for a category. Categories that only
    /// trigger rebuilds of other categories' outputs (templates, config)
    /// yield no units of their own.
    fn units(&self, category: Category) -> Result<Vec<Unit>, SiteError>;

    /// Produce the artifact bytes for one unit.
    fn render(&self, unit: &Unit) -> Result<Vec<u8>, RecoveryError>;
}

/// Directory layout for a filesystem-backed site.
#[derive(Debug, Clone)]
pub struct SiteLayout {
    pub content_dir: PathBuf,
    pub static_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Shared base context cloned into every page render.
///
/// Cloning per unit (rather than sharing a mutable context) is what lets
/// page units run in parallel without observing each other's state.
#[derive(Debug, Clone)]
pub struct BaseContext {
    pub site_name: String,
    pub site_url: String,
    pub language: String,
}

/// Everything a renderer needs to produce one page.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub base: BaseContext,
    pub slug: String,
    pub title: String,
    pub body_html: String,
    pub rating: Rating,
}

/// Aggregate rating shown on game pages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub value: f64,
    pub count: u32,
}

/// Structured site data the orchestrator loads leniently at build start.
/// A missing or corrupt data file degrades to the defaults, never an error.
#[derive(Debug, Clone, Default)]
pub struct SiteData {
    /// Editorial rating overrides keyed by page slug
    /// (`content/ratings.json`). Pages without an override get a
    /// [`deterministic_rating`].
    pub rating_overrides: BTreeMap<String, Rating>,
}

/// Render callable injected by the caller. Real template engines plug in
/// here; the core only ever sees this shape.
pub type PageRenderer = Box<dyn Fn(&PageContext) -> Result<String, RecoveryError> + Send + Sync>;

/// The stock [`UnitSource`]: content-file pages plus verbatim static assets.
pub struct FsSite {
    layout: SiteLayout,
    base: BaseContext,
    ratings: BTreeMap<String, Rating>,
    renderer: PageRenderer,
}

impl FsSite {
    pub fn new(layout: SiteLayout, base: BaseContext, renderer: PageRenderer) -> Self {
        Self {
            layout,
            base,
            ratings: BTreeMap::new(),
            renderer,
        }
    }

    /// Attach editorial rating overrides (see [`SiteData`]).
    pub fn with_ratings(mut self, ratings: BTreeMap<String, Rating>) -> Self {
        self.ratings = ratings;
        self
    }

    fn page_units(&self) -> Result<Vec<Unit>, SiteError> {
        let mut units = Vec::new();
        if !self.layout.content_dir.exists() {
            return Ok(units);
        }
        for entry in WalkDir::new(&self.layout.content_dir)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("html") {
                continue;
            }
            let slug = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            units.push(Unit {
                output_path: page_output_path(&self.layout.output_dir, &slug),
                key: slug,
                source_path: Some(path.to_path_buf()),
            });
        }
        units.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(units)
    }

    fn asset_units(&self) -> Result<Vec<Unit>, SiteError> {
        let mut units = Vec::new();
        if !self.layout.static_dir.exists() {
            return Ok(units);
        }
        for entry in WalkDir::new(&self.layout.static_dir)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let rel = path
                .strip_prefix(&self.layout.static_dir)
                .unwrap_or(path)
                .to_path_buf();
            units.push(Unit {
                key: rel.to_string_lossy().into_owned(),
                output_path: self.layout.output_dir.join(&rel),
                source_path: Some(path.to_path_buf()),
            });
        }
        units.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(units)
    }

    fn render_page(&self, unit: &Unit) -> Result<String, RecoveryError> {
        let body_html = match &unit.source_path {
            Some(source) if source.exists() => fs::read_to_string(source)?,
            _ => format!("<p>Content not found for {}</p>", unit.key),
        };
        let rating = self
            .ratings
            .get(&unit.key)
            .copied()
            .unwrap_or_else(|| deterministic_rating(&unit.key));
        let context = PageContext {
            base: self.base.clone(),
            slug: unit.key.clone(),
            title: title_from_slug(&unit.key),
            body_html,
            rating,
        };
        (self.renderer)(&context)
    }
}

impl UnitSource for FsSite {
    fn units(&self, category: Category) -> Result<Vec<Unit>, SiteError> {
        match category {
            Category::Content => self.page_units(),
            Category::Static => self.asset_units(),
            // Template and config changes rebuild pages; they have no
            // output artifacts of their own.
            Category::Templates | Category::Config => Ok(Vec::new()),
        }
    }

    fn render(&self, unit: &Unit) -> Result<Vec<u8>, RecoveryError> {
        let is_asset = unit
            .source_path
            .as_deref()
            .is_some_and(|src| src.starts_with(&self.layout.static_dir));
        if is_asset {
            let source = unit
                .source_path
                .as_deref()
                .ok_or_else(|| RecoveryError::Other("asset unit without source".into()))?;
            Ok(fs::read(source)?)
        } else {
            Ok(self.render_page(unit)?.into_bytes())
        }
    }
}

/// Output path for a page slug: clean URLs except for the site root.
pub fn page_output_path(output_dir: &Path, slug: &str) -> PathBuf {
    if slug == "index" {
        output_dir.join("index.html")
    } else {
        output_dir.join(slug).join("index.html")
    }
}

/// Display title from a slug: dashes to spaces, words capitalized.
pub fn title_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic rating derived from a slug.
///
/// Sites have no user-generated review data at build time, so the rating
/// shown on a game page is derived from the slug hash: stable across
/// rebuilds, uniformly spread across pages, and never below 3.0.
pub fn deterministic_rating(slug: &str) -> Rating {
    let digest = Sha256::digest(slug.as_bytes());
    let h = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);

    let raw = 3.0 + f64::from(h % 200) / 100.0;
    let value = (raw * 10.0).round() / 10.0;
    Rating {
        value: value.min(5.0),
        count: 250 + h % 5001,
    }
}

/// Minimal injected renderer used by the CLI. Wraps the page body in a
/// bare document shell; a real template engine replaces this closure.
pub fn plain_renderer() -> PageRenderer {
    Box::new(|ctx: &PageContext| {
        Ok(format!(
            "<!DOCTYPE html>\n\
             <html lang=\"{lang}\">\n\
             <head><meta charset=\"UTF-8\"><title>{title} - {site}</title></head>\n\
             <body>\n<h1>{title}</h1>\n{body}\n\
             <p class=\"rating\">Rated {value:.1} from {count} ratings</p>\n\
             </body>\n</html>\n",
            lang = ctx.base.language,
            title = ctx.title,
            site = ctx.base.site_name,
            body = ctx.body_html,
            value = ctx.rating.value,
            count = ctx.rating.count,
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_layout(tmp: &Path) -> SiteLayout {
        SiteLayout {
            content_dir: tmp.join("content"),
            static_dir: tmp.join("static"),
            templates_dir: tmp.join("templates"),
            output_dir: tmp.join("dist"),
        }
    }

    fn test_base() -> BaseContext {
        BaseContext {
            site_name: "Test Arcade".into(),
            site_url: "https://test.example".into(),
            language: "en-US".into(),
        }
    }

    fn test_site(tmp: &Path) -> FsSite {
        FsSite::new(test_layout(tmp), test_base(), plain_renderer())
    }

    // =========================================================================
    // Unit enumeration
    // =========================================================================

    #[test]
    fn page_units_use_clean_urls() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path().join("content");
        fs::create_dir_all(&content).unwrap();
        fs::write(content.join("index.html"), "<p>home</p>").unwrap();
        fs::write(content.join("about-us.html"), "<p>about</p>").unwrap();

        let site = test_site(tmp.path());
        let units = site.units(Category::Content).unwrap();

        assert_eq!(units.len(), 2);
        let about = units.iter().find(|u| u.key == "about-us").unwrap();
        assert_eq!(about.output_path, tmp.path().join("dist/about-us/index.html"));
        let index = units.iter().find(|u| u.key == "index").unwrap();
        assert_eq!(index.output_path, tmp.path().join("dist/index.html"));
    }

    #[test]
    fn page_units_skip_non_html_files() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path().join("content");
        fs::create_dir_all(&content).unwrap();
        fs::write(content.join("page.html"), "x").unwrap();
        fs::write(content.join("site.toml"), "x").unwrap();
        fs::write(content.join("notes.md"), "x").unwrap();

        let site = test_site(tmp.path());
        assert_eq!(site.units(Category::Content).unwrap().len(), 1);
    }

    #[test]
    fn asset_units_preserve_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let statics = tmp.path().join("static");
        fs::create_dir_all(statics.join("css")).unwrap();
        fs::write(statics.join("css/styles.css"), "body{}").unwrap();

        let site = test_site(tmp.path());
        let units = site.units(Category::Static).unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].key, "css/styles.css");
        assert_eq!(units[0].output_path, tmp.path().join("dist/css/styles.css"));
    }

    #[test]
    fn trigger_only_categories_have_no_units() {
        let tmp = TempDir::new().unwrap();
        let site = test_site(tmp.path());
        assert!(site.units(Category::Templates).unwrap().is_empty());
        assert!(site.units(Category::Config).unwrap().is_empty());
    }

    #[test]
    fn missing_directories_yield_no_units() {
        let tmp = TempDir::new().unwrap();
        let site = test_site(tmp.path());
        assert!(site.units(Category::Content).unwrap().is_empty());
        assert!(site.units(Category::Static).unwrap().is_empty());
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    #[test]
    fn render_page_embeds_body_and_title() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path().join("content");
        fs::create_dir_all(&content).unwrap();
        fs::write(content.join("space-run.html"), "<p>blast off</p>").unwrap();

        let site = test_site(tmp.path());
        let units = site.units(Category::Content).unwrap();
        let html = String::from_utf8(site.render(&units[0]).unwrap()).unwrap();

        assert!(html.contains("<p>blast off</p>"));
        assert!(html.contains("<title>Space Run - Test Arcade</title>"));
        assert!(html.contains("lang=\"en-US\""));
    }

    #[test]
    fn render_missing_content_uses_placeholder() {
        let tmp = TempDir::new().unwrap();
        let site = test_site(tmp.path());
        let unit = Unit {
            key: "ghost".into(),
            output_path: tmp.path().join("dist/ghost/index.html"),
            source_path: Some(tmp.path().join("content/ghost.html")),
        };

        let html = String::from_utf8(site.render(&unit).unwrap()).unwrap();
        assert!(html.contains("Content not found for ghost"));
    }

    #[test]
    fn render_asset_copies_bytes_verbatim() {
        let tmp = TempDir::new().unwrap();
        let statics = tmp.path().join("static");
        fs::create_dir_all(&statics).unwrap();
        fs::write(statics.join("app.js"), b"console.log(1)").unwrap();

        let site = test_site(tmp.path());
        let units = site.units(Category::Static).unwrap();
        assert_eq!(site.render(&units[0]).unwrap(), b"console.log(1)");
    }

    // =========================================================================
    // Slug helpers
    // =========================================================================

    #[test]
    fn title_from_slug_capitalizes_words() {
        assert_eq!(title_from_slug("about-us"), "About Us");
        assert_eq!(title_from_slug("privacy-policy"), "Privacy Policy");
        assert_eq!(title_from_slug("snake"), "Snake");
    }

    // =========================================================================
    // Deterministic rating
    // =========================================================================

    #[test]
    fn rating_override_takes_precedence() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path().join("content");
        fs::create_dir_all(&content).unwrap();
        fs::write(content.join("snake.html"), "<p>snake</p>").unwrap();

        let renderer: PageRenderer = Box::new(|ctx| Ok(format!("{:.1}", ctx.rating.value)));
        let site = FsSite::new(test_layout(tmp.path()), test_base(), renderer).with_ratings(
            BTreeMap::from([(
                "snake".to_string(),
                Rating {
                    value: 4.8,
                    count: 1234,
                },
            )]),
        );

        let units = site.units(Category::Content).unwrap();
        assert_eq!(site.render(&units[0]).unwrap(), b"4.8");
    }

    #[test]
    fn rating_is_stable_across_calls() {
        let a = deterministic_rating("neon-racer");
        let b = deterministic_rating("neon-racer");
        assert_eq!(a, b);
    }

    #[test]
    fn rating_varies_with_slug() {
        // Not guaranteed for arbitrary pairs, but these two differ
        assert_ne!(
            deterministic_rating("neon-racer"),
            deterministic_rating("snake")
        );
    }

    #[test]
    fn rating_stays_in_range() {
        for slug in ["a", "snake", "tetris-clone", "very-long-game-slug-here"] {
            let rating = deterministic_rating(slug);
            assert!((3.0..=5.0).contains(&rating.value), "value for {slug}");
            assert!((250..=5250).contains(&rating.count), "count for {slug}");
        }
    }
}
