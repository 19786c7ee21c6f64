//! # fixroot-config
//!
//! Configuration management for fixroot.
//!
//! Loads configuration from:
//! 1. `~/.fixroot/config.toml` (global)
//! 2. `.fixroot/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! Preloaded processes only ever see the environment layer, see
//! [`Config::from_env`].

pub mod logging;
pub mod path;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fixture root handed to preloaded processes.
pub const ENV_TEST_DIR: &str = "FIXROOT_TEST_DIR";
/// Non-empty value turns on tracing of every redirection decision.
pub const ENV_VERBOSE: &str = "FIXROOT_VERBOSE";
/// Colon-separated namespace prefixes replacing the default set.
pub const ENV_NAMESPACES: &str = "FIXROOT_NAMESPACES";
/// Log filter for the CLI.
pub const ENV_LOG: &str = "FIXROOT_LOG";

/// Namespaces redirected when nothing else is configured.
pub const DEFAULT_NAMESPACES: &[&str] = &["/proc/", "/dev/", "/sys/"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fixture: FixtureConfig,
    pub logging: LoggingConfig,
    pub capture: CaptureConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Load global config (~/.fixroot/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::from_file(&global_path)?;
            }
        }

        // 2. Load project config (.fixroot/config.toml) - overrides global
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            let project_config = Self::from_file(&project_path)?;
            config.merge(project_config);
        }

        // 3. Apply environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Configuration as seen by a preloaded process: defaults plus environment.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Parse a single TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.fixroot/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".fixroot/config.toml"))
    }

    /// Project config path, relative to the working directory.
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".fixroot/config.toml")
    }

    /// Merge another config (project overrides)
    pub fn merge(&mut self, other: Config) {
        if other.fixture.root.is_some() {
            self.fixture.root = other.fixture.root;
        }
        if !other.fixture.namespaces.is_empty() {
            self.fixture.namespaces = other.fixture.namespaces;
        }
        if other.logging.verbose {
            self.logging.verbose = true;
        }
        if other.logging.level != LoggingConfig::default().level {
            self.logging.level = other.logging.level;
        }
        if !other.capture.block_devices.is_empty() {
            self.capture.block_devices = other.capture.block_devices;
        }
        if !other.capture.copy_paths.is_empty() {
            self.capture.copy_paths = other.capture.copy_paths;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_TEST_DIR) {
            // An empty value explicitly disables redirection.
            self.fixture.root = if dir.is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
        if let Some(verbose) = lookup(ENV_VERBOSE) {
            self.logging.verbose = !verbose.is_empty();
        }
        if let Some(prefixes) = lookup(ENV_NAMESPACES) {
            let parsed: Vec<String> = prefixes
                .split(':')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            if !parsed.is_empty() {
                self.fixture.namespaces = parsed;
            }
        }
    }

    /// Namespace prefixes in effect: configured ones, or the defaults.
    pub fn effective_namespaces(&self) -> Vec<String> {
        if self.fixture.namespaces.is_empty() {
            DEFAULT_NAMESPACES.iter().map(|s| s.to_string()).collect()
        } else {
            self.fixture.namespaces.clone()
        }
    }

    /// Environment variables that hand this config to a preloaded process.
    pub fn preload_env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if let Some(root) = &self.fixture.root {
            vars.push((ENV_TEST_DIR.to_string(), root.to_string_lossy().into_owned()));
        }
        if self.logging.verbose {
            vars.push((ENV_VERBOSE.to_string(), "1".to_string()));
        }
        if !self.fixture.namespaces.is_empty() {
            vars.push((ENV_NAMESPACES.to_string(), self.fixture.namespaces.join(":")));
        }
        vars
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Fixture tree configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Fixture root; unset disables redirection
    pub root: Option<PathBuf>,
    /// Namespace prefixes to redirect (empty = defaults)
    pub namespaces: Vec<String>,
}

/// Diagnostic output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Trace every redirection decision to stderr
    pub verbose: bool,
    /// Default CLI log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            level: "warn".to_string(),
        }
    }
}

/// Defaults for `fixroot capture`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Block devices whose attributes are recorded (e.g. "sda")
    pub block_devices: Vec<String>,
    /// Namespace files or directories copied verbatim
    pub copy_paths: Vec<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            block_devices: Vec::new(),
            copy_paths: vec![PathBuf::from("/proc/cpuinfo"), PathBuf::from("/proc/meminfo")],
        }
    }
}
