pub mod config;
pub mod conversion;
pub mod metrics;
pub mod testing;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use conversion::{
    CommandConverter, ConversionError, ConversionJob, ConversionManager, ConverterConfig,
    ConverterSpec, JobSnapshot, JobStatus, LaunchError, ManagerConfig, MediaSource, ParseError,
    StatusFormat, StatusUpdate,
};
