use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
///
/// `CADENCE_MANAGER__POLL_INTERVAL_MS=250` overrides `manager.poll_interval_ms`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("CADENCE_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[manager]
poll_interval_ms = 50

[converters.ogg]
executable = "ffmpeg"
extension = "ogg"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.manager.poll_interval_ms, 50);
        assert!(config.converters.contains_key("ogg"));
    }

    #[test]
    fn test_load_config_from_str_invalid_status_format() {
        let toml = r#"
[converters.ogg]
executable = "ffmpeg"
extension = "ogg"
status_format = "xml"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[manager]
work_dir = "/tmp/cadence-test"

[converters.webm]
executable = "/usr/bin/ffmpeg"
extension = "webm"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(
            config.manager.work_dir.to_str().unwrap(),
            "/tmp/cadence-test"
        );
        assert_eq!(config.converters["webm"].extension, "webm");
    }
}
