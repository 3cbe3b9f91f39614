use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::conversion::{CommandConverter, ConverterConfig, ConverterSpec, ManagerConfig};

use super::ConfigError;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Converters by name
    #[serde(default)]
    pub converters: BTreeMap<String, ConverterConfig>,
}

impl Config {
    /// Names of the configured converters, sorted.
    pub fn converter_names(&self) -> Vec<&str> {
        self.converters.keys().map(String::as_str).collect()
    }

    /// Builds the converter registered under `name`.
    pub fn converter(&self, name: &str) -> Result<Arc<dyn ConverterSpec>, ConfigError> {
        let config = self
            .converters
            .get(name)
            .ok_or_else(|| ConfigError::UnknownConverter(name.to_string()))?;
        Ok(Arc::new(CommandConverter::new(name, config.clone())))
    }
}
