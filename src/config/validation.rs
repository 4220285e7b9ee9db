use std::collections::HashSet;

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_log_level(config)?;
    validate_decoder(config)?;
    validate_telemetry(config)?;
    validate_seeder(config)?;
    validate_custom_tools(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

fn validate_decoder(config: &AppConfig) -> Result<(), ConfigError> {
    if config.decoder.max_consecutive_malformed == Some(0) {
        return Err(validation_err(
            "decoder.max_consecutive_malformed must be greater than 0 when set",
        ));
    }
    Ok(())
}

fn validate_telemetry(config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(system) = config.telemetry.system.as_deref() {
        if system.trim().is_empty() {
            return Err(validation_err("telemetry.system cannot be empty when set"));
        }
    }
    Ok(())
}

fn validate_seeder(config: &AppConfig) -> Result<(), ConfigError> {
    if config.seeder.default_k == 0 {
        return Err(validation_err("seeder.default_k must be greater than 0"));
    }
    if config.seeder.max_sources == 0 {
        return Err(validation_err("seeder.max_sources must be greater than 0"));
    }
    Ok(())
}

fn validate_custom_tools(config: &AppConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for tool in &config.tools.custom {
        if tool.identifier.trim().is_empty() {
            return Err(validation_err("tools.custom: identifier cannot be empty"));
        }
        if tool.server_name.trim().is_empty() || tool.tool_name.trim().is_empty() {
            return Err(validation_err(format!(
                "tools.custom '{}': server_name and tool_name cannot be empty",
                tool.identifier
            )));
        }
        if !seen.insert(tool.identifier.as_str()) {
            return Err(validation_err(format!(
                "tools.custom: duplicate identifier '{}'",
                tool.identifier
            )));
        }
    }
    Ok(())
}
