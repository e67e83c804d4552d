//! Configuration for the DevTerm plugin host
//!
//! Configuration lives in `~/.devterm/config.json` by default:
//!
//! ```json
//! {
//!     "plugins": {
//!         "plugin_dir": "plugins",
//!         "load_builtins": true,
//!         "allowed_plugins": [],
//!         "blocked_plugins": ["grumpy"],
//!         "execute_timeout_secs": 30
//!     }
//! }
//! ```
//!
//! Every field is optional. `DEVTERM_PLUGIN_DIR` overrides `plugin_dir`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PluginError, Result};

/// Environment variable overriding [`PluginConfig::plugin_dir`].
pub const PLUGIN_DIR_ENV: &str = "DEVTERM_PLUGIN_DIR";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub plugins: PluginConfig,
}

/// Plugin host configuration.
///
/// Controls where plugins are discovered, whether built-ins are registered,
/// which discovered plugins are allowed or blocked, and an optional bound on
/// execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Discovery root. Created on first discovery if missing.
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: PathBuf,

    /// Whether the built-in text plugins are registered. Defaults to true.
    #[serde(default = "default_true")]
    pub load_builtins: bool,

    /// Allowlist of plugin names. If empty, all discovered plugins are allowed.
    #[serde(default)]
    pub allowed_plugins: Vec<String>,

    /// Blocklist of plugin names. Blocklist takes precedence over allowlist.
    #[serde(default)]
    pub blocked_plugins: Vec<String>,

    /// Upper bound on a single plugin execution, in seconds.
    #[serde(default)]
    pub execute_timeout_secs: Option<u64>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            plugin_dir: default_plugin_dir(),
            load_builtins: true,
            allowed_plugins: Vec::new(),
            blocked_plugins: Vec::new(),
            execute_timeout_secs: None,
        }
    }
}

impl PluginConfig {
    /// A default configuration bound to `plugin_dir`.
    pub fn with_plugin_dir(plugin_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            ..Self::default()
        }
    }

    /// Check whether a plugin name is permitted by the allow/block lists.
    ///
    /// A plugin is permitted if:
    /// - It is not in the blocked list, AND
    /// - The allowed list is empty (all plugins allowed) OR the plugin is in the allowed list.
    pub fn is_plugin_permitted(&self, name: &str) -> bool {
        if self.blocked_plugins.iter().any(|b| b == name) {
            return false;
        }
        if self.allowed_plugins.is_empty() {
            return true;
        }
        self.allowed_plugins.iter().any(|a| a == name)
    }

    /// The configured execution bound, if any. Zero means unbounded.
    pub fn execute_timeout(&self) -> Option<Duration> {
        self.execute_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn default_plugin_dir() -> PathBuf {
    PathBuf::from(crate::plugins::DEFAULT_PLUGIN_DIR)
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Default config file location (`~/.devterm/config.json`).
    pub fn path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".devterm")
            .join("config.json")
    }

    /// Load from the default location, falling back to defaults when the file
    /// does not exist. Environment overrides are applied.
    pub fn load() -> Result<Self> {
        let path = Self::path();
        let mut config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit file. Environment overrides are not applied.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PluginError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            PluginError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(PLUGIN_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            debug!(dir = %dir, "Plugin directory overridden from environment");
            self.plugins.plugin_dir = PathBuf::from(dir);
        }
    }
}
