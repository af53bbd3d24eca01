//! Site configuration module.
//!
//! Handles loading, validating, and merging the project's `config.toml`.
//! Stock defaults are the base layer; a `config.toml` in the project root
//! overrides any subset of them.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! port = 5000               # Overridden by the PORT environment variable
//! root = "src/frontend"     # Directory served as static files
//!
//! [build]
//! source_dir = "src/frontend"
//! dist_dir = "dist"
//! css = ["navigation", "portfolio", ...]   # Stylesheets under css/, no extension
//! js = ["bundle", "modules/animations", ...]
//! html = ["index", "about", ...]
//! assets = ["img", "resources"]
//! # threads = 4             # Omit for auto = CPU cores
//!
//! [images]
//! dir = "src/frontend/img"
//! extensions = ["jpg", "jpeg", "png"]
//!
//! [interaction]
//! form_fallback_ms = 10000
//! submit_timeout_secs = 10
//! contact_form_id = "contact-form"
//! header_hide_debounce_ms = 100
//!
//! [carousel]
//! slide_width = 200.0
//! gap = 32.0
//! scroll_threshold = 5.0
//!
//! [gallery]
//! selector = ".gallery img"
//! lightbox_class = "rts-lightbox"
//! close_on_backdrop = true
//! close_on_esc = true
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [server]
//! port = 8080
//! ```
//!
//! Unknown keys are rejected to catch typos early.

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

/// Site configuration loaded from `config.toml`.
///
/// All fields have defaults matching the site as it ships. Unknown keys are
/// rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Static server settings.
    pub server: ServerConfig,
    /// Minification pipeline inputs and outputs.
    pub build: BuildConfig,
    /// WebP conversion settings.
    pub images: ImagesConfig,
    /// Interaction-layer timings and hooks.
    pub interaction: InteractionConfig,
    pub carousel: CarouselConfig,
    pub gallery: GalleryConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must be non-zero".into()));
        }
        if self.build.source_dir == self.build.dist_dir {
            return Err(ConfigError::Validation(
                "build.dist_dir must differ from build.source_dir".into(),
            ));
        }
        if self.carousel.slide_width <= 0.0 || self.carousel.gap < 0.0 {
            return Err(ConfigError::Validation(
                "carousel.slide_width must be positive and carousel.gap non-negative".into(),
            ));
        }
        if self.interaction.submit_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "interaction.submit_timeout_secs must be non-zero".into(),
            ));
        }
        if self.images.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "images.extensions must not be empty".into(),
            ));
        }
        let decodable = crate::imaging::supported_input_extensions();
        if let Some(ext) = self
            .images
            .extensions
            .iter()
            .find(|e| !decodable.contains(&e.to_ascii_lowercase().as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "images.extensions: no decoder for {ext:?} (supported: {})",
                decodable.join(", ")
            )));
        }
        if self.gallery.lightbox_class.trim().is_empty() {
            return Err(ConfigError::Validation(
                "gallery.lightbox_class must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub port: u16,
    /// Directory served as static files, relative to the project root.
    pub root: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            root: "src/frontend".to_string(),
        }
    }
}

/// Minification pipeline settings.
///
/// `css`, `js` and `html` list file stems relative to `css/`, `js/` and the
/// source root; extensions are implied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub source_dir: String,
    pub dist_dir: String,
    pub css: Vec<String>,
    pub js: Vec<String>,
    pub html: Vec<String>,
    /// Directories copied verbatim into the dist dir.
    pub assets: Vec<String>,
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub threads: Option<usize>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: "src/frontend".to_string(),
            dist_dir: "dist".to_string(),
            css: strings(&[
                "navigation",
                "portfolio",
                "pages/theme.unified",
                "pages/about",
                "pages/blog",
                "pages/contact",
                "pages/editions",
                "pages/home",
                "pages/impact",
                "pages/partners",
                "pages/team",
            ]),
            js: strings(&[
                "bundle",
                "modules/animations",
                "modules/carousel",
                "modules/gallery",
                "modules/index",
                "modules/navigation",
                "modules/utils",
                "modules/webp-support",
            ]),
            html: strings(&[
                "index",
                "about",
                "team",
                "contact",
                "blog",
                "privacy",
                "terms",
                "accessibility",
                "editions/edition1",
                "editions/edition2",
                "editions/impact",
                "portfolios/theory",
                "portfolios/infrastructure",
                "portfolios/cinema",
                "portfolios/healing",
            ]),
            assets: strings(&["img", "resources"]),
            threads: None,
        }
    }
}

/// Worker threads for the build: every core unless `threads` asks for fewer.
pub fn effective_threads(config: &BuildConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.threads.map(|n| n.clamp(1, cores)).unwrap_or(cores)
}

/// WebP conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Directory scanned recursively for convertible images.
    pub dir: String,
    /// Lowercase extensions that are converted.
    pub extensions: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            dir: "src/frontend/img".to_string(),
            extensions: strings(&["jpg", "jpeg", "png"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InteractionConfig {
    /// How long a submit button stays busy without a response.
    pub form_fallback_ms: u64,
    /// Upper bound on one async form send.
    pub submit_timeout_secs: u64,
    pub contact_form_id: String,
    pub header_hide_debounce_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            form_fallback_ms: 10_000,
            submit_timeout_secs: 10,
            contact_form_id: "contact-form".to_string(),
            header_hide_debounce_ms: 100,
        }
    }
}

/// Carousel geometry in CSS pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CarouselConfig {
    pub slide_width: f64,
    pub gap: f64,
    /// Slack at either end before a button counts as disabled.
    pub scroll_threshold: f64,
}

impl Default for CarouselConfig {
    fn default() -> Self {
        Self {
            slide_width: 200.0,
            gap: 32.0,
            scroll_threshold: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GalleryConfig {
    /// Images that open the lightbox.
    pub selector: String,
    pub lightbox_class: String,
    pub close_on_backdrop: bool,
    pub close_on_esc: bool,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            selector: ".gallery img".to_string(),
            lightbox_class: "rts-lightbox".to_string(),
            close_on_backdrop: true,
            close_on_esc: true,
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// `SiteConfig::default()` as a TOML table; the layer user files sit on.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SiteConfig::default())
        .map_err(|e| ConfigError::Validation(format!("stock defaults: {e}")))
}

/// Deep-merge two TOML values. Tables merge per key; anything else in
/// `overlay` wins outright.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    use toml::Value::Table;
    match (base, overlay) {
        (Table(mut table), Table(user)) => {
            for (key, value) in user {
                let value = match table.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                table.insert(key, value);
            }
            Table(table)
        }
        (_, replacement) => replacement,
    }
}

/// Parse `<dir>/config.toml` without interpreting it. A missing file is
/// not an error.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let file = dir.join("config.toml");
    if !file.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&file)?;
    Ok(Some(toml::from_str(&text)?))
}

/// Layer `overlay` (if any) on `base`, deserialize, validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let config: SiteConfig = overlay.into_iter().fold(base, merge_toml).try_into()?;
    config.validate()?;
    Ok(config)
}

/// The effective configuration for a project root: stock defaults with
/// `config.toml` layered on top. Unknown keys are errors.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, load_raw_config(root)?)
}

/// Documented `config.toml` printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# rts-site Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Static server
# ---------------------------------------------------------------------------
[server]
# Listening port. The PORT environment variable takes precedence.
port = 5000

# Directory served as static files.
root = "src/frontend"

# ---------------------------------------------------------------------------
# Build pipeline
# ---------------------------------------------------------------------------
[build]
source_dir = "src/frontend"
dist_dir = "dist"

# Stylesheets under css/, without the .css extension.
css = [
    "navigation", "portfolio", "pages/theme.unified", "pages/about",
    "pages/blog", "pages/contact", "pages/editions", "pages/home",
    "pages/impact", "pages/partners", "pages/team",
]

# Scripts under js/, without the .js extension.
js = [
    "bundle", "modules/animations", "modules/carousel", "modules/gallery",
    "modules/index", "modules/navigation", "modules/utils", "modules/webp-support",
]

# Pages whose css/js references are rewritten to the minified files.
html = [
    "index", "about", "team", "contact", "blog", "privacy", "terms",
    "accessibility", "editions/edition1", "editions/edition2", "editions/impact",
    "portfolios/theory", "portfolios/infrastructure", "portfolios/cinema",
    "portfolios/healing",
]

# Directories copied as-is.
assets = ["img", "resources"]

# Maximum parallel workers. Omit to auto-detect (= number of CPU cores).
# threads = 4

# ---------------------------------------------------------------------------
# WebP conversion
# ---------------------------------------------------------------------------
[images]
dir = "src/frontend/img"
extensions = ["jpg", "jpeg", "png"]

# ---------------------------------------------------------------------------
# Interaction layer
# ---------------------------------------------------------------------------
[interaction]
# Submit buttons restore themselves after this long without a response.
form_fallback_ms = 10000

# Contact form sends give up after this many seconds.
submit_timeout_secs = 10

contact_form_id = "contact-form"
header_hide_debounce_ms = 100

[carousel]
slide_width = 200.0
gap = 32.0
scroll_threshold = 5.0

[gallery]
selector = ".gallery img"
lightbox_class = "rts-lightbox"
close_on_backdrop = true
close_on_esc = true
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_matches_site() {
        let config = SiteConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.build.css.len(), 11);
        assert_eq!(config.build.js.len(), 8);
        assert_eq!(config.build.html.len(), 15);
        assert_eq!(config.interaction.form_fallback_ms, 10_000);
        assert_eq!(config.gallery.lightbox_class, "rts-lightbox");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r##"
[server]
port = 8080
"##;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        // Default values preserved
        assert_eq!(config.server.root, "src/frontend");
        assert_eq!(config.carousel.slide_width, 200.0);
    }

    #[test]
    fn unknown_keys_rejected() {
        let toml = r##"
[gallery]
selectr = ".photos img"
"##;
        assert!(toml::from_str::<SiteConfig>(toml).is_err());
    }

    #[test]
    fn merge_replaces_lists_and_keeps_siblings() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str(
            r##"
[build]
css = ["main"]
"##,
        )
        .unwrap();
        let config = resolve_config(base, Some(overlay)).unwrap();
        assert_eq!(config.build.css, vec!["main"]);
        assert_eq!(config.build.js.len(), 8);
        assert_eq!(config.build.dist_dir, "dist");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = SiteConfig::default();
        config.build.dist_dir = config.build.source_dir.clone();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = SiteConfig::default();
        config.carousel.slide_width = 0.0;
        assert!(config.validate().is_err());

        let mut config = SiteConfig::default();
        config.interaction.submit_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn image_extensions_need_a_decoder() {
        let mut config = SiteConfig::default();
        config.images.extensions = vec!["JPG".into(), "png".into()];
        assert!(config.validate().is_ok());

        config.images.extensions.push("gif".into());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("\"gif\""), "{err}");
    }

    #[test]
    fn effective_threads_clamps() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let mut build = BuildConfig::default();
        assert_eq!(effective_threads(&build), cores);
        build.threads = Some(1);
        assert_eq!(effective_threads(&build), 1);
        build.threads = Some(cores + 16);
        assert_eq!(effective_threads(&build), cores);
        build.threads = Some(0);
        assert_eq!(effective_threads(&build), 1);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r##"
[interaction]
contact_form_id = "enquiry"

[gallery]
close_on_esc = false
"##,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.interaction.contact_form_id, "enquiry");
        assert!(!config.gallery.close_on_esc);
        assert!(config.gallery.close_on_backdrop);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "[server]\nport = 0\n").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = SiteConfig::default();
        assert_eq!(config.build.css, defaults.build.css);
        assert_eq!(config.build.html, defaults.build.html);
        assert_eq!(config.server.port, defaults.server.port);
        assert_eq!(config.gallery.selector, defaults.gallery.selector);
    }
}
