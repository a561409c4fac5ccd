//! Configuration loading for recsys-proxyd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.recsys-proxy-cache/config.toml` (user)
//! 3. `/etc/recsys-proxy-cache/config.toml` (system)
//!
//! Everything is read once at startup and is immutable afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{HighCardinalityField, HighCardinalityKeys, StoreConfig};
use crate::resolver::{DiscoveryFormat, ResolverConfig};
use crate::{ProxyCacheError, Result};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0:50051).
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:50051".to_string()
}

/// Score cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Idle expiry in seconds (default: 300).
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
    #[serde(default = "default_write_queue_capacity")]
    pub write_queue_capacity: usize,
    #[serde(default = "default_write_workers")]
    pub write_workers: usize,
    /// Inline high-cardinality fields.
    #[serde(default)]
    pub high_cardinality: Vec<HighCardinalityField>,
    /// JSON file of high-cardinality fields; inline entries win on conflict.
    #[serde(default)]
    pub high_cardinality_file: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            idle_secs: default_idle_secs(),
            write_queue_capacity: default_write_queue_capacity(),
            write_workers: default_write_workers(),
            high_cardinality: Vec::new(),
            high_cardinality_file: None,
        }
    }
}

fn default_max_entries() -> u64 {
    200_000_000
}

fn default_idle_secs() -> u64 {
    300
}

fn default_write_queue_capacity() -> usize {
    10_000
}

fn default_write_workers() -> usize {
    3
}

impl CacheConfig {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new()
            .max_entries(self.max_entries)
            .idle(Duration::from_secs(self.idle_secs))
            .write_queue_capacity(self.write_queue_capacity)
            .write_workers(self.write_workers)
    }

    /// Build the high-cardinality key set. Fails on unknown hash functions.
    pub fn high_cardinality_keys(&self) -> Result<HighCardinalityKeys> {
        let from_file = match &self.high_cardinality_file {
            Some(path) => HighCardinalityKeys::load(path)?,
            None => HighCardinalityKeys::empty(),
        };
        let inline = HighCardinalityKeys::from_fields(self.high_cardinality.iter().cloned())?;
        Ok(from_file.merge(inline))
    }
}

/// Scoring backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Static backend base URL, e.g. `http://tfserving:8501`.
    #[serde(default)]
    pub url: Option<String>,
    /// Hard budget per scoring call in milliseconds (default: 150).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Raw HTTP timeout in milliseconds (default: 500).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Route the `random` model to random scores (development only).
    #[serde(default)]
    pub enable_random_model: bool,
    /// Resolve backend addresses by polling a discovery endpoint.
    #[serde(default)]
    pub discovery: Option<DiscoveryConfig>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            enable_random_model: false,
            discovery: None,
        }
    }
}

fn default_timeout_ms() -> u64 {
    150
}

fn default_request_timeout_ms() -> u64 {
    500
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Lookaside discovery settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    pub url: String,
    /// Refresh interval in seconds; 0 disables periodic polling (default: 30).
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    /// Longest a request waits for the first resolution (default: 2000).
    #[serde(default = "default_first_wait_ms")]
    pub max_first_wait_ms: u64,
    #[serde(default)]
    pub format: DiscoveryFormat,
    /// Scheme used to reach resolved addresses (default: http).
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

fn default_refresh_secs() -> u64 {
    30
}

fn default_http_timeout_ms() -> u64 {
    2_000
}

fn default_first_wait_ms() -> u64 {
    2_000
}

fn default_scheme() -> String {
    "http".to_string()
}

impl From<&DiscoveryConfig> for ResolverConfig {
    fn from(config: &DiscoveryConfig) -> Self {
        ResolverConfig::new(config.url.clone())
            .refresh_interval(Duration::from_secs(config.refresh_secs))
            .http_timeout(Duration::from_millis(config.http_timeout_ms))
            .max_wait_for_first_resolution(Duration::from_millis(config.max_first_wait_ms))
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.recsys-proxy-cache/config.toml`
    /// 3. `/etc/recsys-proxy-cache/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            ProxyCacheError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content)
            .map_err(|e| ProxyCacheError::Configuration(format!("{path:?}: {e}")))
    }

    /// Parse and validate TOML content.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| {
            ProxyCacheError::Configuration(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot serve a request.
    pub fn validate(&self) -> Result<()> {
        let backend = &self.backend;
        if backend.url.is_some() && backend.discovery.is_some() {
            return Err(ProxyCacheError::Configuration(
                "backend.url and backend.discovery are mutually exclusive".to_string(),
            ));
        }
        if backend.url.is_none() && backend.discovery.is_none() && !backend.enable_random_model {
            return Err(ProxyCacheError::Configuration(
                "no scoring backend configured: set backend.url or [backend.discovery]"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(ProxyCacheError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".recsys-proxy-cache").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/recsys-proxy-cache/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(ProxyCacheError::Configuration(
            "No config file found. Create ~/.recsys-proxy-cache/config.toml or /etc/recsys-proxy-cache/config.toml"
                .to_string(),
        ))
    }
}
