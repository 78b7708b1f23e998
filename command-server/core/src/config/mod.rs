//! TOML Configuration File Support
//!
//! Configuration for both halves of the protocol, from a TOML file at
//! `~/.config/command-server/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [transport]
//! service_name = "command-server"
//! temp_root = "/tmp"
//!
//! [protocol]
//! staleness_threshold_ms = 3000
//!
//! [client]
//! response_timeout_ms = 3000
//! poll_interval_ms = 10
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::{DEFAULT_POLL_INTERVAL, DEFAULT_RESPONSE_TIMEOUT};
use crate::engine::DEFAULT_STALENESS_THRESHOLD;
use crate::transport::{CommunicationDir, FixedPaths, PathProvider, SystemPaths};

/// Service name used when none is configured
pub const DEFAULT_SERVICE_NAME: &str = "command-server";

/// Environment variable overriding the service name
pub const ENV_SERVICE_NAME: &str = "COMMAND_SERVER_SERVICE_NAME";
/// Environment variable overriding the temporary root
pub const ENV_TEMP_ROOT: &str = "COMMAND_SERVER_TEMP_ROOT";
/// Environment variable overriding the staleness threshold (ms)
pub const ENV_STALENESS_MS: &str = "COMMAND_SERVER_STALENESS_MS";
/// Environment variable overriding the client response timeout (ms)
pub const ENV_RESPONSE_TIMEOUT_MS: &str = "COMMAND_SERVER_RESPONSE_TIMEOUT_MS";
/// Environment variable overriding the client poll interval (ms)
pub const ENV_POLL_INTERVAL_MS: &str = "COMMAND_SERVER_POLL_INTERVAL_MS";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Transport section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// Name the communication directory is derived from
    pub service_name: Option<String>,

    /// Directory the communication directory is created under
    pub temp_root: Option<PathBuf>,
}

/// Protocol section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolToml {
    /// Maximum request age in milliseconds
    pub staleness_threshold_ms: Option<u64>,
}

/// Client section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// How long to wait for a response in milliseconds
    pub response_timeout_ms: Option<u64>,

    /// Interval between response polls in milliseconds
    pub poll_interval_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandServerToml {
    /// Transport configuration section
    pub transport: TransportToml,
    /// Protocol configuration section
    pub protocol: ProtocolToml,
    /// Client configuration section
    pub client: ClientToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration
///
/// Use [`load_config`] to load it with proper priority handling.
#[derive(Clone, Debug)]
pub struct CommandServerConfig {
    /// Name the communication directory is derived from
    pub service_name: String,
    /// Root override; `None` means the system temporary directory
    pub temp_root: Option<PathBuf>,
    /// Maximum request age
    pub staleness_threshold: Duration,
    /// Client response timeout
    pub response_timeout: Duration,
    /// Client poll interval
    pub poll_interval: Duration,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Source of configuration values
    source: ConfigSource,
}

impl Default for CommandServerConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            temp_root: None,
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl CommandServerConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Path provider for this configuration's temporary root
    #[must_use]
    pub fn path_provider(&self) -> Box<dyn PathProvider> {
        match &self.temp_root {
            Some(root) => Box::new(FixedPaths::with_root(root.clone())),
            None => Box::new(SystemPaths),
        }
    }

    /// The communication directory this configuration resolves to
    #[must_use]
    pub fn communication_dir(&self) -> CommunicationDir {
        CommunicationDir::resolve(self.path_provider().as_ref(), &self.service_name)
    }

    /// Check the values are usable
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for an empty service name, a service name
    /// containing a path separator, or a zero threshold or interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name must not be empty".to_string(),
            ));
        }
        if self.service_name.contains(['/', '\\']) || self.service_name == ".." {
            return Err(ConfigError::ValidationError(format!(
                "service_name {:?} must not contain path separators",
                self.service_name
            )));
        }
        if self.staleness_threshold.is_zero() {
            return Err(ConfigError::ValidationError(
                "staleness_threshold_ms must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/command-server/config.toml` or
/// `~/.config/command-server/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("command-server").join("config.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] after.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the result fails validation. A missing config file is not an error.
pub fn load_config() -> Result<CommandServerConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CommandServerConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration and apply CLI overrides, validating the result once
///
/// A value the file or environment gets wrong can still be corrected on the
/// command line.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the final configuration fails validation.
pub fn load_config_with_overrides(
    path: Option<PathBuf>,
    overrides: &ConfigOverrides,
) -> Result<CommandServerConfig, ConfigError> {
    load_layers(path, overrides, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment values through `env`
fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<CommandServerConfig, ConfigError> {
    load_layers(path, &ConfigOverrides::default(), env)
}

fn load_layers(
    path: Option<PathBuf>,
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<CommandServerConfig, ConfigError> {
    let mut config = CommandServerConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: CommandServerToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    overrides.merge_into(&mut config);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut CommandServerConfig, toml: &CommandServerToml) {
    if let Some(ref name) = toml.transport.service_name {
        config.service_name.clone_from(name);
    }
    if toml.transport.temp_root.is_some() {
        config.temp_root.clone_from(&toml.transport.temp_root);
    }

    if let Some(ms) = toml.protocol.staleness_threshold_ms {
        config.staleness_threshold = Duration::from_millis(ms);
    }

    if let Some(ms) = toml.client.response_timeout_ms {
        config.response_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.client.poll_interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
}

/// Apply environment variable overrides to the config
///
/// Unparseable numeric values are ignored with a warning.
fn apply_env_config(config: &mut CommandServerConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(name) = env(ENV_SERVICE_NAME) {
        config.service_name = name;
        config.source = ConfigSource::Env;
    }

    if let Some(root) = env(ENV_TEMP_ROOT) {
        config.temp_root = Some(PathBuf::from(root));
        config.source = ConfigSource::Env;
    }

    let millis = |key: &str| -> Option<Duration> {
        let raw = env(key)?;
        match raw.parse::<u64>() {
            Ok(ms) => Some(Duration::from_millis(ms)),
            Err(_) => {
                tracing::warn!(var = key, value = %raw, "Ignoring non-numeric environment value");
                None
            }
        }
    };

    if let Some(threshold) = millis(ENV_STALENESS_MS) {
        config.staleness_threshold = threshold;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = millis(ENV_RESPONSE_TIMEOUT_MS) {
        config.response_timeout = timeout;
        config.source = ConfigSource::Env;
    }
    if let Some(interval) = millis(ENV_POLL_INTERVAL_MS) {
        config.poll_interval = interval;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, the highest-priority configuration layer
///
/// Pass them to [`load_config_with_overrides`] so validation sees the final
/// values, or [`apply`](Self::apply) them to an already loaded config.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Service name override
    pub service_name: Option<String>,
    /// Temporary root override
    pub temp_root: Option<PathBuf>,
    /// Staleness threshold override (milliseconds)
    pub staleness_threshold_ms: Option<u64>,
    /// Response timeout override (milliseconds)
    pub response_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if any overrides are set
    #[must_use]
    pub fn has_overrides(&self) -> bool {
        self.service_name.is_some()
            || self.temp_root.is_some()
            || self.staleness_threshold_ms.is_some()
            || self.response_timeout_ms.is_some()
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the overridden configuration is invalid.
    pub fn apply(&self, config: &mut CommandServerConfig) -> Result<(), ConfigError> {
        self.merge_into(config);
        config.validate()
    }

    fn merge_into(&self, config: &mut CommandServerConfig) {
        if !self.has_overrides() {
            return;
        }
        config.source = ConfigSource::Cli;

        if let Some(ref name) = self.service_name {
            config.service_name.clone_from(name);
        }
        if self.temp_root.is_some() {
            config.temp_root.clone_from(&self.temp_root);
        }
        if let Some(ms) = self.staleness_threshold_ms {
            config.staleness_threshold = Duration::from_millis(ms);
        }
        if let Some(ms) = self.response_timeout_ms {
            config.response_timeout = Duration::from_millis(ms);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
