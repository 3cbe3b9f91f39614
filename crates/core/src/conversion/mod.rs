//! Conversion module: supervising external converter processes.
//!
//! This module provides the `ConversionManager`, which launches converter
//! processes, turns their output into progress updates, and notifies
//! observers of each job.
//!
//! # Features
//!
//! - Pluggable converters through the `ConverterSpec` trait
//! - Non-blocking output reading; nothing happens outside `check_notifications`
//! - Progress, duration and ETA tracking per job
//! - Atomic move of finished outputs, cleanup of partial ones
//! - Cancellation
//!
//! # Example
//!
//! ```ignore
//! use cadence_core::conversion::{CommandConverter, ConversionManager, ConverterConfig, ManagerConfig, MediaSource};
//!
//! let mut manager = ConversionManager::new(ManagerConfig::default(), Handle::current());
//! let converter = Arc::new(CommandConverter::new("ogg", ConverterConfig::new("my-converter", "ogg")));
//!
//! let job = manager.start_conversion(MediaSource::new("/path/to/input.flac"), converter)?;
//! job.listen(|job| println!("{} {:.0}%", job.status(), job.progress_percent() * 100.0))?;
//!
//! while manager.running() {
//!     manager.check_notifications();
//!     tokio::time::sleep(manager.config().poll_interval()).await;
//! }
//! ```

mod command;
mod config;
mod error;
mod job;
mod manager;
mod process;
mod status;
mod traits;
mod types;

pub use command::{template_mentions_output, CommandConverter};
pub use config::{ConverterConfig, ManagerConfig};
pub use error::{ConversionError, LaunchError, ParseError};
pub use job::{ConversionJob, ObserverId};
pub use manager::ConversionManager;
pub use process::{
    check_executable, resolve_executable, ExitOutcome, ProcessEvent, ProcessRunner,
    RunningProcess, TokioProcessRunner,
};
pub use status::{parse_ffmpeg_line, parse_json_line, StatusFormat};
pub use traits::ConverterSpec;
pub use types::{JobSnapshot, JobStatus, MediaSource, StatusOutcome, StatusUpdate};
