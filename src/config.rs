//! Configuration management using the prefer crate for discovery.
//!
//! Files named `unipass.{json,toml,yaml}` are discovered in the standard
//! locations; `--config` points at one explicitly. Environment variables
//! and CLI flags override file values, and the result is resolved into
//! [`Settings`] before the run starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::BrowserEngineConfig;
use crate::scrapers::unipass::{ScrapeOptions, DEFAULT_BASE_URL};

pub const DEFAULT_OUTPUT_DIR: &str = "scraped_data";
pub const DEFAULT_START_YEAR: i32 = 2016;
pub const DEFAULT_START_MONTH: u32 = 1;
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_POPUP_TIMEOUT_SECS: u64 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Start month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),
    #[error("Wait timeout must be at least one second")]
    ZeroTimeout,
    #[error("Page cap must be at least 1")]
    ZeroPageCap,
}

/// Start of the date filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default = "default_start_month")]
    pub start_month: u32,
}

fn default_start_year() -> i32 {
    DEFAULT_START_YEAR
}

fn default_start_month() -> u32 {
    DEFAULT_START_MONTH
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            start_year: DEFAULT_START_YEAR,
            start_month: DEFAULT_START_MONTH,
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Output directory root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub search: SearchConfig,
    /// Upper bound on pages walked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    /// Bound for explicit waits, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_secs: Option<u64>,
    /// How long to look for the print pop-up, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popup_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_images: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    pub async fn load() -> Self {
        match prefer::load("unipass").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring {}: {}", path.display(), e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => Self::default_with_env(),
        }
    }

    /// Create a default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => {
                toml::from_str(contents).map_err(|e| format!("Failed to parse TOML config: {}", e))
            }
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// - `UNIPASS_OUTPUT_DIR` - output directory root
    /// - `BROWSER_URL` - remote Chrome DevTools URL
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("UNIPASS_OUTPUT_DIR") {
            if !dir.is_empty() {
                self.output_dir = Some(dir);
            }
        }
        self.browser = self.browser.with_env_overrides();
        self
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Merge CLI overrides and resolve into runtime settings.
    ///
    /// An `--output` flag is taken relative to the working directory; a file
    /// `output_dir` relative to the config file.
    pub fn resolve(&self, overrides: &Overrides, cwd: &Path) -> Result<Settings, ConfigError> {
        let output_dir = match &overrides.output_dir {
            Some(dir) => self.resolve_path(&dir.to_string_lossy(), cwd),
            None => {
                let base = self.base_dir().unwrap_or_else(|| cwd.to_path_buf());
                self.resolve_path(
                    self.output_dir.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR),
                    &base,
                )
            }
        };

        let start_year = overrides.start_year.unwrap_or(self.search.start_year);
        let start_month = overrides.start_month.unwrap_or(self.search.start_month);
        if !(1..=12).contains(&start_month) {
            return Err(ConfigError::InvalidMonth(start_month));
        }

        let max_pages = overrides.max_pages.or(self.max_pages);
        if max_pages == Some(0) {
            return Err(ConfigError::ZeroPageCap);
        }

        let wait_secs = self.wait_timeout_secs.unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS);
        if wait_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let mut browser = self.browser.clone();
        if overrides.headed {
            browser.headless = false;
        }
        if let Some(url) = &overrides.remote_url {
            browser.remote_url = Some(url.clone());
        }

        Ok(Settings {
            output_dir,
            start_year,
            start_month,
            max_pages,
            wait_timeout: Duration::from_secs(wait_secs),
            popup_timeout: Duration::from_secs(
                self.popup_timeout_secs.unwrap_or(DEFAULT_POPUP_TIMEOUT_SECS),
            ),
            download_images: overrides
                .skip_images
                .then_some(false)
                .or(self.download_images)
                .unwrap_or(true),
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            browser,
        })
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output_dir: Option<PathBuf>,
    pub start_year: Option<i32>,
    pub start_month: Option<u32>,
    pub max_pages: Option<u32>,
    pub headed: bool,
    pub remote_url: Option<String>,
    pub skip_images: bool,
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub start_year: i32,
    pub start_month: u32,
    pub max_pages: Option<u32>,
    pub wait_timeout: Duration,
    pub popup_timeout: Duration,
    pub download_images: bool,
    pub base_url: String,
    pub browser: BrowserEngineConfig,
}

impl Settings {
    pub fn scrape_options(&self) -> ScrapeOptions {
        ScrapeOptions {
            base_url: self.base_url.clone(),
            start_year: self.start_year,
            start_month: self.start_month,
            max_pages: self.max_pages,
            wait_timeout: self.wait_timeout,
            popup_timeout: self.popup_timeout,
            download_images: self.download_images,
        }
    }
}
