pub mod validation;

use std::path::Path;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;
use crate::aggregator::{ToolDescriptor, ToolEventRouter};

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for crate::error::CanonicalError {
    fn from(err: ConfigError) -> Self {
        crate::error::CanonicalError::Config(err.to_string())
    }
}

/// Log line encoding on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Text,
        }
    }
}

/// Frame decoder settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Consecutive malformed records that end a turn with a
    /// `malformed_stream` error. Unset never escalates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consecutive_malformed: Option<u32>,
}

/// Telemetry extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Include message text and tool arguments in emitted events.
    #[serde(default)]
    pub capture_content: bool,
    /// Provider label stamped on every event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default = "default_true")]
    pub convert_developer_to_system: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_content: false,
            system: None,
            convert_developer_to_system: true,
        }
    }
}

/// Result seeder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeederConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

fn default_k() -> usize {
    10
}
fn default_max_sources() -> usize {
    16
}

impl Default for SeederConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_sources: default_max_sources(),
        }
    }
}

/// Extra tool identifier registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomToolConfig {
    pub identifier: String,
    pub server_name: String,
    pub tool_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub custom: Vec<CustomToolConfig>,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub seeder: SeederConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl AppConfig {
    /// Built-in tool registry extended with the configured custom tools.
    #[must_use]
    pub fn tool_router(&self) -> ToolEventRouter {
        let mut router = ToolEventRouter::with_builtin_tools();
        for tool in &self.tools.custom {
            router.register(
                tool.identifier.clone(),
                ToolDescriptor::new(tool.server_name.clone(), tool.tool_name.clone()),
            );
        }
        router
    }
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] or [`ConfigError::Validation`].
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to defaults.
///
/// # Errors
///
/// Same as [`load_config`] once the file is present.
pub fn load_config_or_default(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(AppConfig::default());
    }
    load_config(path)
}
