//! Site configuration module.
//!
//! Handles loading and validating `site.toml`. Configuration is a structured
//! type with explicitly optional fields — nothing in the pipeline probes for
//! the presence of attributes at runtime; absent values fall back to the
//! defaults below at deserialization time.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [site]
//! name = "Arcade Forge"         # Site title, used in fallback pages
//! url = "https://example.com"   # Canonical base URL
//! language = "en-US"            # BCP 47 language tag
//!
//! [build]
//! max_workers = 8               # Max parallel workers (omit for auto)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse — override just the values you want:
//!
//! ```toml
//! # Only override the site name
//! [site]
//! name = "Puzzle Palace"
//! ```
//!
//! Unknown keys are rejected to catch typos early.
//!
//! ## Validation
//!
//! `site.toml` is the one input whose corruption cannot be degraded around:
//! every generated page embeds the site name and URL, so a bad config poisons
//! the entire output. [`SiteConfig::validate`] errors are therefore treated
//! as critical by the orchestrator and abort the build. Suspicious-but-legal
//! values (e.g. a trailing slash on the URL) surface as warnings via
//! [`SiteConfig::lint`] and do not block the build.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `site.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Site identity (name, canonical URL, language).
    pub site: SiteInfo,
    /// Build-time settings (worker pool size).
    pub build: BuildConfig,
}

/// Site identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteInfo {
    /// Site title. Embedded in fallback pages and generated page contexts.
    pub name: String,
    /// Canonical base URL, scheme included.
    pub url: String,
    /// BCP 47 language tag for generated pages.
    pub language: String,
}

impl Default for SiteInfo {
    fn default() -> Self {
        Self {
            name: "Arcade Forge".to_string(),
            url: "https://example.com".to_string(),
            language: "en-US".to_string(),
        }
    }
}

/// Build-time settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Maximum number of parallel generation workers.
    /// When absent, defaults to `min(32, CPU cores + 4)`.
    /// Values larger than that ceiling are clamped down.
    pub max_workers: Option<usize>,
}

impl SiteConfig {
    /// Load `site.toml` from a content root. A missing file yields the
    /// stock defaults; a file that exists but fails to parse or validate
    /// is an error — the orchestrator treats it as critical.
    pub fn load(content_root: &Path) -> Result<Self, ConfigError> {
        let path = content_root.join("site.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "site.name must not be empty".into(),
            ));
        }
        if !valid_site_name(&self.site.name) {
            return Err(ConfigError::Validation(format!(
                "site.name '{}' contains invalid characters (allowed: alphanumerics, spaces, dots, hyphens)",
                self.site.name
            )));
        }
        if !self.site.url.starts_with("http://") && !self.site.url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "site.url '{}' must start with http:// or https://",
                self.site.url
            )));
        }
        if self.site.language.trim().is_empty() {
            return Err(ConfigError::Validation(
                "site.language must not be empty".into(),
            ));
        }
        if self.build.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "build.max_workers must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Non-fatal config smells, surfaced as build warnings.
    pub fn lint(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.site.url.ends_with('/') {
            warnings.push(format!(
                "site.url '{}' has a trailing slash; generated links will contain '//'",
                self.site.url
            ));
        }
        if self.site.url == SiteInfo::default().url {
            warnings.push("site.url is the placeholder default; set it before deploying".into());
        }
        warnings
    }
}

/// Site names end up in file paths (cache names, web manifest) and must stay
/// shell- and URL-safe: alphanumerics, spaces, dots, and hyphens only.
fn valid_site_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '-'))
}

/// Print-ready stock config with every option documented.
pub fn stock_config_toml() -> String {
    "\
# arcade-forge site configuration
# All options are optional - defaults shown below.

[site]
name = \"Arcade Forge\"         # Site title, used in fallback pages
url = \"https://example.com\"   # Canonical base URL
language = \"en-US\"            # BCP 47 language tag

[build]
# max_workers = 8              # Max parallel workers (omit for auto)
"
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // =========================================================================
    // Defaults and loading
    // =========================================================================

    #[test]
    fn default_config_is_valid() {
        let config = SiteConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.site.language, "en-US");
        assert_eq!(config.build.max_workers, None);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = SiteConfig::load(tmp.path()).unwrap();
        assert_eq!(config.site.name, SiteInfo::default().name);
    }

    #[test]
    fn load_partial_config_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("site.toml"),
            "[site]\nname = \"Puzzle Palace\"\n",
        )
        .unwrap();

        let config = SiteConfig::load(tmp.path()).unwrap();
        assert_eq!(config.site.name, "Puzzle Palace");
        assert_eq!(config.site.url, SiteInfo::default().url);
    }

    #[test]
    fn load_rejects_unknown_keys() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("site.toml"),
            "[site]\nnmae = \"typo\"\n", // deliberate typo
        )
        .unwrap();

        assert!(matches!(
            SiteConfig::load(tmp.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("site.toml"),
            "[site]\nurl = \"ftp://example.com\"\n",
        )
        .unwrap();

        assert!(matches!(
            SiteConfig::load(tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_rejects_empty_name() {
        let mut config = SiteConfig::default();
        config.site.name = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_shell_unsafe_name() {
        let mut config = SiteConfig::default();
        config.site.name = "games; rm -rf /".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_dotted_hyphenated_name() {
        let mut config = SiteConfig::default();
        config.site.name = "retro-arcade.io".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = SiteConfig::default();
        config.build.max_workers = Some(0);
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // Lint warnings
    // =========================================================================

    #[test]
    fn lint_flags_trailing_slash() {
        let mut config = SiteConfig::default();
        config.site.url = "https://example.com/".into();
        let warnings = config.lint();
        assert!(warnings.iter().any(|w| w.contains("trailing slash")));
    }

    #[test]
    fn lint_default_config_flags_placeholder_url_only() {
        let config = SiteConfig::default();
        assert_eq!(config.lint().len(), 1);
    }

    // =========================================================================
    // Stock config
    // =========================================================================

    #[test]
    fn stock_config_parses_and_validates() {
        let stock: SiteConfig = toml::from_str(&stock_config_toml()).unwrap();
        assert!(stock.validate().is_ok());
    }
}
