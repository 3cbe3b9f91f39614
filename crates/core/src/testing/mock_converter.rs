//! Mock converter spec for testing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::conversion::{
    parse_json_line, ConverterSpec, LaunchError, MediaSource, ParseError, StatusUpdate,
};

/// Mock implementation of the ConverterSpec trait.
///
/// Speaks the JSON status line protocol and records what it was asked:
/// - Arguments are `[source, output]`
/// - Executable defaults to the running test binary, which always exists
/// - Every parsed line is counted
///
/// # Example
///
/// ```rust,ignore
/// use cadence_core::testing::MockConverter;
///
/// let converter = MockConverter::new().with_executable("/missing/tool");
/// let job = manager.start_conversion(source, Arc::new(converter.clone()))?;
///
/// manager.check_notifications();
/// assert_eq!(converter.parse_calls(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockConverter {
    extension: String,
    executable: Arc<Mutex<Option<PathBuf>>>,
    unavailable: Arc<Mutex<Option<String>>>,
    parse_calls: Arc<AtomicUsize>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    /// Create a new mock converter producing `.fake` files.
    pub fn new() -> Self {
        Self {
            extension: "fake".to_string(),
            executable: Arc::new(Mutex::new(None)),
            unavailable: Arc::new(Mutex::new(None)),
            parse_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Use a different output extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Point the converter at a specific executable.
    pub fn with_executable(self, path: impl Into<PathBuf>) -> Self {
        *self.executable.lock().unwrap() = Some(path.into());
        self
    }

    /// Make `executable()` itself fail.
    pub fn set_unavailable(&self, reason: impl Into<String>) {
        *self.unavailable.lock().unwrap() = Some(reason.into());
    }

    /// Number of lines handed to the parser so far.
    pub fn parse_calls(&self) -> usize {
        self.parse_calls.load(Ordering::SeqCst)
    }
}

impl ConverterSpec for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn executable(&self) -> Result<PathBuf, LaunchError> {
        if let Some(reason) = self.unavailable.lock().unwrap().clone() {
            return Err(LaunchError::unavailable(reason));
        }
        if let Some(path) = self.executable.lock().unwrap().clone() {
            return Ok(path);
        }
        std::env::current_exe().map_err(|e| LaunchError::unavailable(e.to_string()))
    }

    fn arguments(&self, source: &MediaSource, output: &Path) -> Vec<String> {
        vec![
            source.path().to_string_lossy().into_owned(),
            output.to_string_lossy().into_owned(),
        ]
    }

    fn process_status_line(
        &self,
        _source: &MediaSource,
        line: &str,
    ) -> Result<Option<StatusUpdate>, ParseError> {
        self.parse_calls.fetch_add(1, Ordering::SeqCst);
        parse_json_line(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_executable_exists() {
        let converter = MockConverter::new();
        assert!(converter.executable().unwrap().exists());
    }

    #[test]
    fn test_arguments_are_source_and_output() {
        let converter = MockConverter::new();
        let args = converter.arguments(&MediaSource::new("/in.webm"), Path::new("/out.fake"));
        assert_eq!(args, vec!["/in.webm", "/out.fake"]);
    }

    #[test]
    fn test_counts_parse_calls() {
        let converter = MockConverter::new();
        let source = MediaSource::new("/in.webm");
        let clone = converter.clone();
        converter
            .process_status_line(&source, r#"{"progress": 1.0}"#)
            .unwrap();
        assert!(converter.process_status_line(&source, "garbage").is_err());
        assert_eq!(clone.parse_calls(), 2);
    }

    #[test]
    fn test_unavailable() {
        let converter = MockConverter::new();
        converter.set_unavailable("no license");
        assert!(matches!(
            converter.executable(),
            Err(LaunchError::Unavailable { .. })
        ));
    }
}
