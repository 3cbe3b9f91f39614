//! Configuration for the conversion manager and command converters.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::status::StatusFormat;

/// Configuration for the [`ConversionManager`](super::ConversionManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Directory holding in-flight (temporary) outputs.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory receiving finished outputs. Defaults to the source's directory.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// How often the application loop should call `check_notifications`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("cadence")
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            output_dir: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ManagerConfig {
    /// Sets the work directory.
    pub fn with_work_dir(mut self, work_dir: PathBuf) -> Self {
        self.work_dir = work_dir;
        self
    }

    /// Sets the output directory.
    pub fn with_output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = Some(output_dir);
        self
    }

    /// Sets the poll interval in milliseconds.
    pub fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// A converter described entirely by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path or bare program name of the converter executable.
    pub executable: PathBuf,

    /// Output file extension, without the leading dot.
    pub extension: String,

    /// Argument template. `{input}` and `{output}` are substituted per job.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Line protocol of the converter's standard output.
    #[serde(default)]
    pub status_format: StatusFormat,
}

fn default_args() -> Vec<String> {
    vec!["{input}".to_string(), "{output}".to_string()]
}

impl ConverterConfig {
    /// Creates a config with the default `{input} {output}` arguments.
    pub fn new(executable: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            extension: extension.into(),
            args: default_args(),
            status_format: StatusFormat::default(),
        }
    }

    /// Replaces the argument template.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the status line format.
    pub fn with_status_format(mut self, format: StatusFormat) -> Self {
        self.status_format = format;
        self
    }
}
