//! Configuration for the fixture mock server.
//!
//! Defines where fixtures live, how lookup values map to file names,
//! delay limits, and watcher settings.

use crate::sanitize::is_safe;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Main configuration for the fixture mock server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Fixture tree layout and lookup rules
    #[serde(default)]
    pub fixtures: FixtureSettings,

    /// Latency simulation limits
    #[serde(default)]
    pub delay: DelaySettings,

    /// Hot reload settings
    #[serde(default)]
    pub watch: WatchSettings,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.fixtures
            .validate()
            .map_err(|e| anyhow::anyhow!("fixtures: {}", e))?;
        self.delay
            .validate()
            .map_err(|e| anyhow::anyhow!("delay: {}", e))?;
        self.watch
            .validate()
            .map_err(|e| anyhow::anyhow!("watch: {}", e))?;
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Address to bind
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

/// Fixture tree layout and lookup rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureSettings {
    /// Root directory of the fixture tree
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Name of the default fixture, at the root and inside categories
    #[serde(default = "default_default_file")]
    pub default_file: String,

    /// Name of the per-category configuration file
    #[serde(default = "default_config_file")]
    pub config_file: String,

    /// Request field carrying the lookup value
    #[serde(default = "default_lookup_field")]
    pub lookup_field: String,

    /// File name prefixes tried, in order, before the bare value
    #[serde(default = "default_known_prefixes")]
    pub known_prefixes: Vec<String>,

    /// Write a placeholder default fixture on startup if none exists
    #[serde(default = "default_true")]
    pub seed_default: bool,
}

impl Default for FixtureSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            default_file: default_default_file(),
            config_file: default_config_file(),
            lookup_field: default_lookup_field(),
            known_prefixes: default_known_prefixes(),
            seed_default: true,
        }
    }
}

impl FixtureSettings {
    /// Validate the fixture settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_json_file_name("default_file", &self.default_file)?;
        validate_json_file_name("config_file", &self.config_file)?;
        if self.default_file == self.config_file {
            anyhow::bail!("default_file and config_file must differ");
        }
        if self.lookup_field.is_empty() {
            anyhow::bail!("lookup_field cannot be empty");
        }
        for prefix in &self.known_prefixes {
            if prefix.is_empty() || !is_safe(prefix) {
                anyhow::bail!("Invalid known prefix: {:?}", prefix);
            }
        }
        Ok(())
    }
}

fn validate_json_file_name(field: &str, name: &str) -> anyhow::Result<()> {
    let stem = name
        .strip_suffix(".json")
        .ok_or_else(|| anyhow::anyhow!("{} must end in .json: {:?}", field, name))?;
    if stem.is_empty() || !is_safe(stem) {
        anyhow::bail!("{} must be a plain file name: {:?}", field, name);
    }
    Ok(())
}

fn default_root() -> PathBuf {
    PathBuf::from("responses")
}

fn default_default_file() -> String {
    "default.json".to_string()
}

fn default_config_file() -> String {
    "config.json".to_string()
}

fn default_lookup_field() -> String {
    "id".to_string()
}

fn default_known_prefixes() -> Vec<String> {
    ["user_", "order_", "resource_", "payment_", "transaction_"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

/// Latency simulation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelaySettings {
    /// Request field carrying a per-request delay override
    #[serde(default = "default_delay_param")]
    pub param: String,

    /// Overrides at or above this value are ignored (ms)
    #[serde(default = "default_max_override_ms")]
    pub max_override_ms: u64,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            param: default_delay_param(),
            max_override_ms: default_max_override_ms(),
        }
    }
}

impl DelaySettings {
    /// Validate the delay settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.param.is_empty() {
            anyhow::bail!("param cannot be empty");
        }
        if self.max_override_ms <= 1 {
            anyhow::bail!("max_override_ms must be greater than 1");
        }
        Ok(())
    }
}

fn default_delay_param() -> String {
    "_delay".to_string()
}

fn default_max_override_ms() -> u64 {
    5000
}

/// Hot reload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSettings {
    /// Watch the fixture tree and evict changed files from the cache
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Glob patterns (relative to the root) whose events are ignored
    #[serde(default = "default_watch_ignore")]
    pub ignore: Vec<String>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ignore: default_watch_ignore(),
        }
    }
}

fn default_watch_ignore() -> Vec<String> {
    vec!["**/*.swp".to_string(), "**/*~".to_string()]
}

impl WatchSettings {
    /// Validate the watch settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        for pattern in &self.ignore {
            globset::Glob::new(pattern).map_err(|e| anyhow::anyhow!("Invalid glob: {}", e))?;
        }
        Ok(())
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log every served request
    #[serde(default = "default_true")]
    pub log_requests: bool,

    /// Log responses served from a fallback tier
    #[serde(default = "default_true")]
    pub log_fallbacks: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_requests: true,
            log_fallbacks: true,
        }
    }
}
