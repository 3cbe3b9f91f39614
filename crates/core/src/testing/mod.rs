//! Testing utilities and mock implementations.
//!
//! These mocks let the conversion manager be exercised without launching
//! real converter processes.
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence_core::testing::{MockConverter, MockRunner};
//!
//! let runner = MockRunner::new();
//! runner.push_script(vec![vec![ProcessEvent::Line(r#"{"progress": 1.0}"#.into())]]);
//!
//! let mut manager = ConversionManager::with_runner(config, Arc::new(runner.clone()));
//! let job = manager.start_conversion(source, Arc::new(MockConverter::new()))?;
//! ```

mod mock_converter;
mod mock_runner;

pub use mock_converter::MockConverter;
pub use mock_runner::{MockRunner, ProcessScript, RecordedLaunch, ScriptedProcess};

/// Event builders for scripts.
pub mod fixtures {
    use crate::conversion::{ExitOutcome, ProcessEvent};

    /// A JSON progress line.
    pub fn progress_line(duration: f64, progress: f64) -> ProcessEvent {
        ProcessEvent::Line(format!(
            r#"{{"duration": {:.1}, "progress": {:.1}}}"#,
            duration, progress
        ))
    }

    /// A JSON error line.
    pub fn error_line(message: &str) -> ProcessEvent {
        ProcessEvent::Line(serde_json::json!({ "error": message }).to_string())
    }

    /// A process exit with the given code.
    pub fn exit(code: i32) -> ProcessEvent {
        ProcessEvent::Exited(ExitOutcome::with_code(code))
    }
}
