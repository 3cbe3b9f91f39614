//! Error types for the conversion module.

use std::path::PathBuf;
use thiserror::Error;

/// The converter's executable could not be started.
///
/// This is distinct from a conversion that starts and then fails: a launch
/// error never occupies process resources.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Executable path does not exist (or could not be found on `PATH`).
    #[error("{path:?} does not exist")]
    NotFound { path: PathBuf },

    /// Executable exists but cannot be run.
    #[error("{path:?} is not executable")]
    NotExecutable { path: PathBuf },

    /// The converter refused to provide an executable.
    #[error("Converter unavailable: {reason}")]
    Unavailable { reason: String },

    /// Spawning the process failed for another reason.
    #[error("Failed to spawn {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Creates an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// A single status line could not be understood.
///
/// Parse errors are recoverable: the line is dropped and the conversion
/// continues.
#[derive(Debug, Error)]
#[error("Failed to parse status line {line:?}: {reason}")]
pub struct ParseError {
    pub line: String,
    pub reason: String,
}

impl ParseError {
    /// Creates a new parse error for the given line.
    pub fn new(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            reason: reason.into(),
        }
    }
}

/// Contract violations and setup failures raised by the manager.
///
/// Failures of individual conversions are never reported through this type;
/// they land on the job's `error` field and reach observers as a `failed`
/// notification.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The job already delivered its terminal notification.
    #[error("Conversion {id} already finished")]
    JobFinished { id: String },

    /// The job has not reached a terminal status yet.
    #[error("Conversion {id} is still in progress")]
    JobNotFinished { id: String },

    /// The job is not tracked by this manager.
    #[error("Conversion {id} is not tracked by this manager")]
    UnknownJob { id: String },

    /// Preparing the working directory failed.
    #[error("Failed to prepare work directory {path:?}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
