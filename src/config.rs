// src/config.rs

//! Manages proxy configuration: loading, defaults, and validation.

use anyhow::{Context as _, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cdn-cache")
}
fn default_max_size_bytes() -> u64 {
    2 * 1024 * 1024 * 1024 * 1024 // 2 TiB
}
fn default_body_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000 // 24 hours
}
fn default_flush_debounce_ms() -> u64 {
    2000
}
fn default_report_interval_secs() -> u64 {
    60
}
fn default_verbosity() -> u8 {
    2
}
fn default_browser_channel() -> String {
    "chrome".to_string()
}

/// Settings for the storage engine.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheConfig {
    /// The directory holding the index files and the sharded blob store.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// The disk limit for cached bodies. Eviction keeps the total below this.
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
    /// How long a stored body is served without revalidation.
    #[serde(default = "default_body_ttl_ms")]
    pub body_ttl_ms: u64,
    /// Window for batching index writes after a mutation.
    #[serde(default = "default_flush_debounce_ms")]
    pub flush_debounce_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_size_bytes: default_max_size_bytes(),
            body_ttl_ms: default_body_ttl_ms(),
            flush_debounce_ms: default_flush_debounce_ms(),
        }
    }
}

/// Pattern lists for revenue-bearing traffic that must never be cached.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BypassConfig {
    /// Glob-ish URL patterns for ad auction and decisioning traffic (class A).
    #[serde(default)]
    pub auction_patterns: Vec<String>,
    /// Glob-ish URL patterns for measurement and beacon traffic (class B).
    #[serde(default)]
    pub beacon_patterns: Vec<String>,
}

/// Settings for the periodic savings report.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReportConfig {
    /// Interval between reports in seconds. `0` disables the periodic report.
    #[serde(default = "default_report_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_report_interval_secs(),
        }
    }
}

/// Settings passed through to the browser automation layer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrowserConfig {
    /// Browser channel selection (e.g. "chrome", "chrome-beta").
    #[serde(default = "default_browser_channel")]
    pub channel: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            channel: default_browser_channel(),
        }
    }
}

/// The top-level configuration for the proxy core.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Log verbosity, 0 (errors only) through 4 (trace).
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub bypass: BypassConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbosity: default_verbosity(),
            cache: CacheConfig::default(),
            bypass: BypassConfig::default(),
            report: ReportConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Maps the numeric verbosity level onto a tracing filter directive.
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        }
    }

    fn validate(&self) -> Result<()> {
        if self.cache.max_size_bytes == 0 {
            bail!("cache.max_size_bytes must be greater than zero");
        }
        if self.cache.body_ttl_ms == 0 {
            bail!("cache.body_ttl_ms must be greater than zero");
        }
        Ok(())
    }
}
