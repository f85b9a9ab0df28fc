//! Application configuration loading from config.toml
//!
//! Holds the reconciliation cadence, the health probe tuning knobs and the list of
//! systems to seed on first run. Every field has a default so an empty file is valid.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::{path::Path, time::Duration};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Database URL; `DATABASE_URL` in the environment overrides it
    #[serde(default)]
    pub database_url: Option<String>,
    /// Seconds between automatic reconciliation passes in the daemon
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Health probe settings
    #[serde(default)]
    pub health: HealthSettings,
    /// Systems to seed when missing
    #[serde(default)]
    pub systems: Vec<SystemConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            poll_interval_secs: default_poll_interval_secs(),
            health: HealthSettings::default(),
            systems: Vec::new(),
        }
    }
}

/// Tuning for the health prober and the health-driven reconciliation pass.
#[derive(Debug, Deserialize, Clone)]
pub struct HealthSettings {
    /// Per-probe timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum number of redirects followed by a probe
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// User agent sent with every probe
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Number of probes allowed in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Pause after each probe, in milliseconds, to avoid hammering targets
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,
    /// Minimum seconds between interactive health runs from the same session
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    /// Route probes through the proxies named in the environment
    #[serde(default = "default_use_system_proxy")]
    pub use_system_proxy: bool,
}

impl HealthSettings {
    /// Per-probe timeout as a [`Duration`]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Inter-probe delay as a [`Duration`]
    #[must_use]
    pub const fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    /// Throttle window as a [`Duration`]
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            concurrency: default_concurrency(),
            probe_delay_ms: default_probe_delay_ms(),
            min_interval_secs: default_min_interval_secs(),
            use_system_proxy: default_use_system_proxy(),
        }
    }
}

/// Configuration for a single monitored system
#[derive(Debug, Deserialize, Clone)]
pub struct SystemConfig {
    /// Display name, also used to detect already-seeded systems
    pub name: String,
    /// Domain or URL to probe
    pub domain: String,
    /// Contact person or mailbox
    #[serde(default)]
    pub contact: Option<String>,
    /// Skip automated health checks for this system
    #[serde(default)]
    pub exclude_health_check: bool,
}

const fn default_poll_interval_secs() -> u64 {
    60
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_max_redirects() -> usize {
    3
}

fn default_user_agent() -> String {
    format!("StatusDesk-HealthCheck/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_concurrency() -> usize {
    4
}

const fn default_probe_delay_ms() -> u64 {
    100
}

const fn default_min_interval_secs() -> u64 {
    120
}

const fn default_use_system_proxy() -> bool {
    true
}

/// Loads the application configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A system entry is missing its name or domain
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    parse_config(&contents)
}

/// Parses configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;

    if config.health.concurrency == 0 {
        return Err(Error::Config {
            message: "health.concurrency must be at least 1".to_string(),
        });
    }

    Ok(config)
}

/// Loads configuration from `./config.toml`, falling back to defaults when the file is absent.
pub fn load_default_config() -> Result<AppConfig> {
    let path = Path::new("config.toml");
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!("No config.toml found, using built-in defaults");
        Ok(AppConfig::default())
    }
}
