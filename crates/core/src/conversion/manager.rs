//! Conversion manager: starts jobs and pumps their notifications.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::metrics;

use super::config::ManagerConfig;
use super::error::ConversionError;
use super::job::ConversionJob;
use super::process::{ProcessRunner, TokioProcessRunner};
use super::traits::ConverterSpec;
use super::types::MediaSource;

const TEMP_SUFFIX: &str = "part";

/// Owns the in-flight conversions.
///
/// The manager never spawns its own timer: the application calls
/// [`check_notifications`](Self::check_notifications) periodically and all
/// state changes and observer callbacks happen inside that call.
pub struct ConversionManager {
    config: ManagerConfig,
    runner: Arc<dyn ProcessRunner>,
    in_progress: Vec<ConversionJob>,
    notify_queue: Vec<ConversionJob>,
    /// Ended jobs whose process has not exited yet.
    reaping: Vec<ConversionJob>,
}

impl ConversionManager {
    /// Creates a manager launching processes on the given tokio runtime.
    pub fn new(config: ManagerConfig, handle: Handle) -> Self {
        Self::with_runner(config, Arc::new(TokioProcessRunner::new(handle)))
    }

    /// Creates a manager with a custom process runner.
    pub fn with_runner(config: ManagerConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config,
            runner,
            in_progress: Vec::new(),
            notify_queue: Vec::new(),
            reaping: Vec::new(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Jobs that have not reached a terminal status yet.
    pub fn in_progress(&self) -> &[ConversionJob] {
        &self.in_progress
    }

    /// Jobs with notifications waiting for the next pump.
    pub fn notify_queue(&self) -> &[ConversionJob] {
        &self.notify_queue
    }

    /// Whether any conversion is still in progress.
    pub fn running(&self) -> bool {
        !self.in_progress.is_empty()
    }

    /// Whether nothing is running and every stopped converter has exited.
    pub fn idle(&self) -> bool {
        self.in_progress.is_empty() && self.reaping.is_empty()
    }

    /// Starts converting `source` with `converter`.
    ///
    /// The job is returned before any notification is delivered, so callers
    /// can `listen` without missing anything. A launch failure does not make
    /// this call fail: it surfaces as a `failed` notification on the next pump.
    pub fn start_conversion(
        &mut self,
        source: MediaSource,
        converter: Arc<dyn ConverterSpec>,
    ) -> Result<ConversionJob, ConversionError> {
        std::fs::create_dir_all(&self.config.work_dir).map_err(|e| ConversionError::WorkDir {
            path: self.config.work_dir.clone(),
            source: e,
        })?;

        let (temp_output, output) = self.allocate_paths(&source, converter.extension());
        let job = ConversionJob::new(source, Arc::clone(&converter), temp_output, output);
        metrics::CONVERSIONS_STARTED.inc();

        let launched = converter.executable().and_then(|executable| {
            let args = converter.arguments(job.source(), job.temp_output());
            tracing::debug!(job = %job.id(), ?executable, ?args, "Launching converter");
            self.runner.launch(&executable, &args)
        });

        match launched {
            Ok(process) => {
                tracing::info!(
                    job = %job.id(),
                    source = %job.source(),
                    converter = converter.name(),
                    pid = ?process.id(),
                    "Conversion started"
                );
                job.attach_process(process);
            }
            Err(e) => {
                job.record_launch_failure(e.to_string());
                self.enqueue(&job);
            }
        }

        self.track(&job)?;
        Ok(job)
    }

    /// Starts a fresh conversion of a finished job's source.
    pub fn retry_conversion(
        &mut self,
        job: &ConversionJob,
    ) -> Result<ConversionJob, ConversionError> {
        if !job.is_terminal() {
            return Err(ConversionError::JobNotFinished { id: job.id() });
        }
        self.start_conversion(job.source().clone(), Arc::clone(job.converter()))
    }

    /// Reads new output from every running job and delivers notifications.
    ///
    /// Returns the number of notifications delivered.
    pub fn check_notifications(&mut self) -> usize {
        self.reaping.retain(|job| !job.reap());

        for job in self.in_progress.clone() {
            if job.collect_output() {
                self.enqueue(&job);
            }
        }

        let queue = std::mem::take(&mut self.notify_queue);
        let delivered = queue.iter().map(ConversionJob::deliver).sum();

        let mut still_running = Vec::with_capacity(self.in_progress.len());
        for job in self.in_progress.drain(..) {
            if job.is_terminal() {
                record_terminal(&job);
                if !job.reap() {
                    self.reaping.push(job);
                }
            } else {
                still_running.push(job);
            }
        }
        self.in_progress = still_running;

        delivered
    }

    /// Cancels a running job. The `canceled` notification arrives on the next pump.
    ///
    /// Returns whether this call requested the cancellation; repeated calls
    /// and calls on finished jobs do nothing.
    pub fn cancel_conversion(&mut self, job: &ConversionJob) -> bool {
        if !self.in_progress.contains(job) || !job.request_cancel() {
            return false;
        }
        tracing::info!(job = %job.id(), "Cancellation requested");
        self.enqueue(job);
        true
    }

    /// Cancels every running job. Returns how many were newly canceled.
    pub fn cancel_all(&mut self) -> usize {
        let mut canceled = 0;
        for job in self.in_progress.clone() {
            if self.cancel_conversion(&job) {
                canceled += 1;
            }
        }
        canceled
    }

    fn track(&mut self, job: &ConversionJob) -> Result<(), ConversionError> {
        if job.is_terminal() {
            return Err(ConversionError::JobFinished { id: job.id() });
        }
        if !self.in_progress.contains(job) {
            self.in_progress.push(job.clone());
            metrics::CONVERSIONS_ACTIVE.inc();
        }
        Ok(())
    }

    fn enqueue(&mut self, job: &ConversionJob) {
        if !self.notify_queue.contains(job) {
            self.notify_queue.push(job.clone());
        }
    }

    /// Picks temp and final paths no other in-flight job uses.
    fn allocate_paths(&self, source: &MediaSource, extension: &str) -> (PathBuf, PathBuf) {
        let output_dir = self
            .config
            .output_dir
            .clone()
            .or_else(|| source.path().parent().map(Path::to_path_buf))
            .unwrap_or_else(|| self.config.work_dir.clone());
        let stem = source.stem();

        let mut attempt = 0u32;
        loop {
            let base = if attempt == 0 {
                stem.clone()
            } else {
                format!("{}-{}", stem, attempt)
            };
            let name = if extension.is_empty() {
                base
            } else {
                format!("{}.{}", base, extension)
            };
            let temp = self
                .config
                .work_dir
                .join(format!("{}.{}", name, TEMP_SUFFIX));
            let output = output_dir.join(&name);
            attempt += 1;

            let taken = self
                .in_progress
                .iter()
                .chain(&self.reaping)
                .any(|job| job.temp_output() == temp || job.output() == output);
            if taken || temp.exists() || output.exists() || output == source.path() {
                continue;
            }
            return (temp, output);
        }
    }
}

fn record_terminal(job: &ConversionJob) {
    metrics::CONVERSIONS_ACTIVE.dec();
    let status = job.status();
    metrics::CONVERSIONS_TOTAL
        .with_label_values(&[status.as_str()])
        .inc();
    if let (Some(start), Some(end)) = (job.started_at(), job.finished_at()) {
        let secs = (end - start).num_milliseconds().max(0) as f64 / 1000.0;
        metrics::CONVERSION_DURATION
            .with_label_values(&[status.as_str()])
            .observe(secs);
    }
}
