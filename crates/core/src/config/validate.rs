use super::{types::Config, ConfigError};
use crate::conversion::template_mentions_output;

/// Validate configuration
/// Currently validates:
/// - Poll interval is not 0
/// - Every converter has an executable and an extension
/// - Every converter's arguments receive the output path
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.manager.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "manager.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    for (name, converter) in &config.converters {
        if converter.executable.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "converters.{}.executable cannot be empty",
                name
            )));
        }

        if converter.extension.is_empty() || converter.extension.starts_with('.') {
            return Err(ConfigError::ValidationError(format!(
                "converters.{}.extension must be a non-empty extension without a leading dot",
                name
            )));
        }

        if !template_mentions_output(&converter.args) {
            return Err(ConfigError::ValidationError(format!(
                "converters.{}.args must reference {{output}}",
                name
            )));
        }
    }

    Ok(())
}
