//! Trait definitions for the conversion module.

use std::path::{Path, PathBuf};

use super::error::{LaunchError, ParseError};
use super::types::{MediaSource, StatusUpdate};

/// Describes how to run one kind of conversion.
///
/// The manager never special-cases a converter: it asks the converter for the
/// executable and arguments, and hands every output line back to it.
pub trait ConverterSpec: Send + Sync {
    /// Human readable name, used in logs.
    fn name(&self) -> &str;

    /// Extension of the produced file, without the leading dot.
    fn extension(&self) -> &str;

    /// Returns the executable to launch.
    fn executable(&self) -> Result<PathBuf, LaunchError>;

    /// Returns the arguments converting `source` into `output`.
    fn arguments(&self, source: &MediaSource, output: &Path) -> Vec<String>;

    /// Parses one line of the process's standard output.
    ///
    /// Returns `Ok(None)` for lines that carry no status.
    fn process_status_line(
        &self,
        source: &MediaSource,
        line: &str,
    ) -> Result<Option<StatusUpdate>, ParseError>;
}
