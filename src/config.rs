use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::search::SearchSettings;
use crate::store::CacheSettings;

pub const DEFAULT_SOURCE_URL: &str =
    "https://raw.githubusercontent.com/ripienaar/free-for-dev/refs/heads/master/README.md";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_url")]
    pub url: String,
    /// Read the document from disk instead of `url`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            path: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_source_url() -> String {
    DEFAULT_SOURCE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    #[serde(default = "default_memory_ttl_secs")]
    pub memory_ttl_secs: u64,
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_hours: default_ttl_hours(),
            memory_ttl_secs: default_memory_ttl_secs(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

/// `~/.cache/free-for-dev-mcp` on Linux; falls back to `./.cache` when the
/// platform has no cache directory.
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("free-for-dev-mcp")
}
fn default_ttl_hours() -> u64 {
    24
}
fn default_memory_ttl_secs() -> u64 {
    600
}
fn default_memory_capacity() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_search_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_search_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            cache_capacity: default_search_cache_capacity(),
            cache_ttl_secs: default_search_cache_ttl_secs(),
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_max_limit() -> usize {
    50
}
fn default_search_cache_capacity() -> usize {
    100
}
fn default_search_cache_ttl_secs() -> u64 {
    300
}
fn default_fuzzy_threshold() -> f64 {
    0.34
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7331".to_string()
}

impl SearchConfig {
    pub fn settings(&self) -> SearchSettings {
        SearchSettings {
            cache_capacity: self.cache_capacity,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            fuzzy_threshold: self.fuzzy_threshold,
        }
    }

    /// Clamp a caller-supplied limit to `[1, max_limit]`.
    pub fn clamp_limit(&self, limit: usize) -> usize {
        limit.clamp(1, self.max_limit)
    }
}

impl CacheConfig {
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            max_age: Duration::from_secs(self.ttl_hours.saturating_mul(60 * 60)),
            memory_ttl: Duration::from_secs(self.memory_ttl_secs),
            memory_capacity: self.memory_capacity,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to built-in defaults.
pub fn resolve_config(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found; using defaults");
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.source.path.is_none() && config.source.url.trim().is_empty() {
        anyhow::bail!("source.url must be set when source.path is absent");
    }

    if config.cache.ttl_hours == 0 {
        anyhow::bail!("cache.ttl_hours must be > 0");
    }
    if config.cache.memory_capacity == 0 {
        anyhow::bail!("cache.memory_capacity must be > 0");
    }

    if config.search.default_limit == 0 {
        anyhow::bail!("search.default_limit must be >= 1");
    }
    if config.search.max_limit < config.search.default_limit {
        anyhow::bail!("search.max_limit must be >= search.default_limit");
    }
    if config.search.cache_capacity == 0 {
        anyhow::bail!("search.cache_capacity must be > 0");
    }
    if !(0.0..1.0).contains(&config.search.fuzzy_threshold) {
        anyhow::bail!("search.fuzzy_threshold must be in [0.0, 1.0)");
    }

    Ok(())
}
