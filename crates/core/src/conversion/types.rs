//! Types for the conversion module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Status of a conversion job.
///
/// Transitions only move forward: `Pending -> Converting -> {Finished, Failed, Canceled}`,
/// or `Pending -> Failed` when the process cannot be launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Converting,
    Finished,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Whether no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Canceled)
    }

    /// Stable lowercase name, used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Converting => "converting",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result signalled explicitly by a status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusOutcome {
    /// The converter reports it is done. The exit code still decides.
    Finished,
    /// The converter reports an error.
    Failed(String),
}

/// One parsed snapshot of a conversion's progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Total duration of the source in seconds, when the line carries it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Seconds of media processed so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Explicit terminal result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StatusOutcome>,
}

impl StatusUpdate {
    /// An update carrying progress and optionally the total duration.
    pub fn progress(duration: Option<f64>, progress: f64) -> Self {
        Self {
            duration,
            progress: Some(progress),
            outcome: None,
        }
    }

    /// An update announcing successful completion.
    pub fn finished() -> Self {
        Self {
            outcome: Some(StatusOutcome::Finished),
            ..Default::default()
        }
    }

    /// An update announcing an error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: Some(StatusOutcome::Failed(message.into())),
            ..Default::default()
        }
    }
}

/// The file a conversion reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaSource {
    path: PathBuf,
}

impl MediaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without its extension, used to name outputs.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "output".to_string())
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Serializable view of a job at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub source: PathBuf,
    pub converter: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub temp_output: PathBuf,
    pub output: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
