//! A single conversion and its lifecycle.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::metrics;

use super::error::ConversionError;
use super::process::{ExitOutcome, ProcessEvent, RunningProcess};
use super::traits::ConverterSpec;
use super::types::{JobSnapshot, JobStatus, MediaSource, StatusOutcome, StatusUpdate};

/// Identifies a registered observer, for [`ConversionJob::unlisten`].
pub type ObserverId = u64;

type Observer = Box<dyn FnMut(&ConversionJob) + Send>;

/// Something that happened to a job and has not been applied yet.
#[derive(Debug)]
pub(crate) enum JobEvent {
    LaunchFailed(String),
    Update(StatusUpdate),
    Exited(ExitOutcome),
    Cancel,
}

struct JobState {
    status: JobStatus,
    duration: Option<f64>,
    progress: f64,
    error: Option<String>,
    completion_signaled: bool,
    cancel_requested: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    process: Option<Box<dyn RunningProcess>>,
    pending: VecDeque<JobEvent>,
}

#[derive(Default)]
struct ObserverList {
    next_id: ObserverId,
    entries: Vec<(ObserverId, Observer)>,
    removed_while_notifying: Vec<ObserverId>,
    notifying: bool,
    closed: bool,
}

struct JobInner {
    id: Uuid,
    source: MediaSource,
    converter: Arc<dyn ConverterSpec>,
    temp_output: PathBuf,
    output: PathBuf,
    state: Mutex<JobState>,
    observers: Mutex<ObserverList>,
}

/// One requested conversion.
///
/// Cloning is cheap and every clone refers to the same job; equality is
/// identity. The job stays readable after it leaves the manager.
#[derive(Clone)]
pub struct ConversionJob {
    inner: Arc<JobInner>,
}

impl ConversionJob {
    pub(crate) fn new(
        source: MediaSource,
        converter: Arc<dyn ConverterSpec>,
        temp_output: PathBuf,
        output: PathBuf,
    ) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id: Uuid::new_v4(),
                source,
                converter,
                temp_output,
                output,
                state: Mutex::new(JobState {
                    status: JobStatus::Pending,
                    duration: None,
                    progress: 0.0,
                    error: None,
                    completion_signaled: false,
                    cancel_requested: false,
                    started_at: None,
                    finished_at: None,
                    process: None,
                    pending: VecDeque::new(),
                }),
                observers: Mutex::new(ObserverList::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, ObserverList> {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.inner.id.to_string()
    }

    pub fn source(&self) -> &MediaSource {
        &self.inner.source
    }

    pub fn converter(&self) -> &Arc<dyn ConverterSpec> {
        &self.inner.converter
    }

    /// Where the converter writes while the job is running.
    pub fn temp_output(&self) -> &Path {
        &self.inner.temp_output
    }

    /// Where the result lands once the job finished.
    pub fn output(&self) -> &Path {
        &self.inner.output
    }

    pub fn status(&self) -> JobStatus {
        self.state().status
    }

    /// Total duration in seconds, once the converter reported it.
    pub fn duration(&self) -> Option<f64> {
        self.state().duration
    }

    /// Seconds of media converted so far.
    pub fn progress(&self) -> f64 {
        self.state().progress
    }

    /// Seconds left, never negative. `None` until the duration is known.
    pub fn eta(&self) -> Option<f64> {
        let state = self.state();
        state.duration.map(|d| (d - state.progress).max(0.0))
    }

    /// Fraction done in `0.0..=1.0`.
    pub fn progress_percent(&self) -> f64 {
        let state = self.state();
        match state.duration {
            Some(d) if d > 0.0 => (state.progress / d).clamp(0.0, 1.0),
            _ if state.status == JobStatus::Finished => 1.0,
            _ => 0.0,
        }
    }

    /// Failure message; only set when the status is `failed`.
    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state().started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state().finished_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state();
        JobSnapshot {
            id: self.id(),
            source: self.inner.source.path().to_path_buf(),
            converter: self.inner.converter.name().to_string(),
            status: state.status,
            duration: state.duration,
            progress: state.progress,
            eta: state.duration.map(|d| (d - state.progress).max(0.0)),
            error: state.error.clone(),
            temp_output: self.inner.temp_output.clone(),
            output: self.inner.output.clone(),
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    /// Registers a callback run on every notification, including the terminal one.
    ///
    /// Callbacks run synchronously inside `check_notifications`.
    pub fn listen<F>(&self, callback: F) -> Result<ObserverId, ConversionError>
    where
        F: FnMut(&ConversionJob) + Send + 'static,
    {
        let mut observers = self.observers();
        if observers.closed {
            return Err(ConversionError::JobFinished { id: self.id() });
        }
        let id = observers.next_id;
        observers.next_id += 1;
        observers.entries.push((id, Box::new(callback)));
        Ok(id)
    }

    /// Removes a callback. Returns whether it was registered.
    pub fn unlisten(&self, observer: ObserverId) -> bool {
        let mut observers = self.observers();
        if observers.notifying {
            observers.removed_while_notifying.push(observer);
            return true;
        }
        let before = observers.entries.len();
        observers.entries.retain(|(id, _)| *id != observer);
        observers.entries.len() != before
    }

    pub(crate) fn attach_process(&self, process: Box<dyn RunningProcess>) {
        let mut state = self.state();
        state.process = Some(process);
        state.status = JobStatus::Converting;
        state.started_at = Some(Utc::now());
    }

    pub(crate) fn record_launch_failure(&self, message: String) {
        let mut state = self.state();
        state.started_at = Some(Utc::now());
        state.pending.push_back(JobEvent::LaunchFailed(message));
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.state().pending.is_empty()
    }

    /// Drains whatever the process produced since the last call and parses it.
    ///
    /// Returns whether the job has events waiting to be delivered.
    pub(crate) fn collect_output(&self) -> bool {
        let raw = {
            let mut state = self.state();
            if state.status.is_terminal() || state.cancel_requested {
                return !state.pending.is_empty();
            }
            let mut raw = Vec::new();
            if let Some(process) = state.process.as_mut() {
                while let Some(event) = process.try_next_event() {
                    let exited = matches!(event, ProcessEvent::Exited(_));
                    raw.push(event);
                    if exited {
                        break;
                    }
                }
            }
            raw
        };

        let mut parsed = Vec::with_capacity(raw.len());
        for event in raw {
            match event {
                ProcessEvent::Line(line) => {
                    match self
                        .inner
                        .converter
                        .process_status_line(&self.inner.source, &line)
                    {
                        Ok(Some(update)) => parsed.push(JobEvent::Update(update)),
                        Ok(None) => {}
                        Err(e) => {
                            metrics::STATUS_LINES_DROPPED.inc();
                            tracing::debug!(job = %self.inner.id, error = %e, "Dropping status line");
                        }
                    }
                }
                ProcessEvent::Exited(outcome) => parsed.push(JobEvent::Exited(outcome)),
            }
        }

        let mut state = self.state();
        state.pending.extend(parsed);
        !state.pending.is_empty()
    }

    /// Requests cancellation. Returns whether this call initiated it.
    pub(crate) fn request_cancel(&self) -> bool {
        let mut state = self.state();
        if state.status != JobStatus::Converting || state.cancel_requested {
            return false;
        }
        state.cancel_requested = true;
        if let Some(process) = state.process.as_mut() {
            process.terminate();
        }
        state.pending.clear();
        state.pending.push_back(JobEvent::Cancel);
        true
    }

    /// Watches for the exit of a process that outlived its job.
    ///
    /// A canceled or failed converter is only asked to stop; it may still
    /// touch the temporary output until it actually exits. Returns whether no
    /// process is left.
    pub(crate) fn reap(&self) -> bool {
        let mut state = self.state();
        let Some(process) = state.process.as_mut() else {
            return true;
        };
        let exited = loop {
            match process.try_next_event() {
                Some(ProcessEvent::Exited(_)) => break true,
                Some(ProcessEvent::Line(_)) => {}
                None => break false,
            }
        };
        if !exited {
            return false;
        }

        state.process = None;
        let finished = state.status == JobStatus::Finished;
        drop(state);
        if !finished {
            self.remove_temp_output();
        }
        tracing::debug!(job = %self.inner.id, "Converter process exited");
        true
    }

    /// Applies pending events in order, notifying observers after each change.
    ///
    /// Returns the number of notifications delivered.
    pub(crate) fn deliver(&self) -> usize {
        let mut delivered = 0;
        loop {
            let changed = {
                let mut state = self.state();
                let Some(event) = state.pending.pop_front() else {
                    break;
                };
                let changed = self.apply(&mut state, event);
                if state.status.is_terminal() {
                    let dropped: Vec<JobEvent> = state.pending.drain(..).collect();
                    if dropped.iter().any(|e| matches!(e, JobEvent::Exited(_))) {
                        state.process = None;
                    }
                }
                changed
            };

            if changed {
                self.notify();
                delivered += 1;
            }
        }

        if self.status().is_terminal() {
            let mut observers = self.observers();
            observers.closed = true;
            observers.entries.clear();
        }
        delivered
    }

    fn apply(&self, state: &mut JobState, event: JobEvent) -> bool {
        if state.status.is_terminal() {
            return false;
        }

        match event {
            JobEvent::LaunchFailed(message) => {
                tracing::info!(job = %self.inner.id, error = %message, "Conversion could not start");
                self.fail(state, message);
                true
            }
            JobEvent::Update(update) => self.apply_update(state, update),
            JobEvent::Exited(outcome) => {
                state.process = None;
                if !outcome.success() {
                    if state.completion_signaled {
                        tracing::debug!(job = %self.inner.id, code = ?outcome.code, "Converter signalled completion but exit code disagrees");
                    }
                    self.fail(state, outcome.describe_failure());
                    return true;
                }
                match self.finalize_output() {
                    Ok(()) => {
                        let total = state.duration.unwrap_or(state.progress).max(state.progress);
                        state.duration = Some(total);
                        state.progress = total;
                        state.status = JobStatus::Finished;
                        state.finished_at = Some(Utc::now());
                        tracing::info!(job = %self.inner.id, output = ?self.inner.output, "Conversion finished");
                    }
                    Err(message) => self.fail(state, message),
                }
                true
            }
            JobEvent::Cancel => {
                if let Some(process) = state.process.as_mut() {
                    process.terminate();
                }
                self.remove_temp_output();
                state.status = JobStatus::Canceled;
                state.finished_at = Some(Utc::now());
                tracing::info!(job = %self.inner.id, "Conversion canceled");
                true
            }
        }
    }

    fn apply_update(&self, state: &mut JobState, update: StatusUpdate) -> bool {
        if let Some(StatusOutcome::Failed(message)) = update.outcome {
            if let Some(process) = state.process.as_mut() {
                process.terminate();
            }
            self.fail(state, message);
            return true;
        }
        if update.outcome == Some(StatusOutcome::Finished) {
            state.completion_signaled = true;
        }

        // A duration on its own is recorded silently and reported with the
        // next progress change, so notifications always advance progress.
        if state.duration.is_none() {
            if let Some(duration) = update.duration.filter(|d| d.is_finite() && *d >= 0.0) {
                // Progress never moves backwards, even if it overshot a late duration.
                state.duration = Some(duration.max(state.progress));
            }
        }

        let mut changed = false;
        if let Some(progress) = update.progress.filter(|p| p.is_finite()) {
            let mut next = progress.max(state.progress);
            if let Some(duration) = state.duration {
                next = next.min(duration);
            }
            if next > state.progress {
                state.progress = next;
                changed = true;
            }
        }

        if changed {
            tracing::debug!(
                job = %self.inner.id,
                progress = state.progress,
                duration = ?state.duration,
                "Conversion progress"
            );
        }
        changed
    }

    fn fail(&self, state: &mut JobState, message: String) {
        self.remove_temp_output();
        tracing::info!(job = %self.inner.id, error = %message, "Conversion failed");
        state.status = JobStatus::Failed;
        state.error = Some(message);
        state.finished_at = Some(Utc::now());
    }

    /// Moves the temporary output to its final place.
    fn finalize_output(&self) -> Result<(), String> {
        let temp = &self.inner.temp_output;
        let output = &self.inner.output;

        if !temp.exists() {
            return Err("Conversion produced no output".to_string());
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }

        if std::fs::rename(temp, output).is_ok() {
            return Ok(());
        }

        // Rename fails across filesystems; fall back to copy + remove.
        std::fs::copy(temp, output)
            .map_err(|e| format!("Failed to move output to {}: {}", output.display(), e))?;
        self.remove_temp_output();
        Ok(())
    }

    fn remove_temp_output(&self) {
        match std::fs::remove_file(&self.inner.temp_output) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = ?self.inner.temp_output,
                error = %e,
                "Failed to remove temporary output"
            ),
        }
    }

    fn notify(&self) {
        let mut entries = {
            let mut observers = self.observers();
            observers.notifying = true;
            std::mem::take(&mut observers.entries)
        };

        for (_, callback) in entries.iter_mut() {
            callback(self);
        }

        let mut observers = self.observers();
        let added = std::mem::take(&mut observers.entries);
        entries.extend(added);
        let removed = std::mem::take(&mut observers.removed_while_notifying);
        entries.retain(|(id, _)| !removed.contains(id));
        observers.entries = entries;
        observers.notifying = false;
    }
}

impl PartialEq for ConversionJob {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ConversionJob {}

impl Hash for ConversionJob {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for ConversionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("ConversionJob")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("converter", &self.inner.converter.name())
            .field("status", &state.status)
            .field("duration", &state.duration)
            .field("progress", &state.progress)
            .field("error", &state.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConverter;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    fn job_in(dir: &TempDir) -> ConversionJob {
        ConversionJob::new(
            MediaSource::new(dir.path().join("clip.webm")),
            Arc::new(MockConverter::new()),
            dir.path().join("clip.fake.part"),
            dir.path().join("clip.fake"),
        )
    }

    fn recorder(job: &ConversionJob) -> Arc<StdMutex<Vec<(JobStatus, f64, Option<f64>)>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        job.listen(move |job| {
            sink.lock()
                .unwrap()
                .push((job.status(), job.progress(), job.eta()));
        })
        .unwrap();
        seen
    }

    #[test]
    fn test_new_job_is_pending() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir);
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.progress(), 0.0);
        assert!(job.duration().is_none());
        assert!(job.eta().is_none());
        assert!(job.error().is_none());
        assert_eq!(job.progress_percent(), 0.0);
    }

    #[test]
    fn test_updates_clamp_and_stay_monotonic() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir);
        job.state().status = JobStatus::Converting;
        let seen = recorder(&job);

        {
            let mut state = job.state();
            state
                .pending
                .push_back(JobEvent::Update(StatusUpdate::progress(Some(5.0), 2.0)));
            state
                .pending
                .push_back(JobEvent::Update(StatusUpdate::progress(None, 1.0)));
            state
                .pending
                .push_back(JobEvent::Update(StatusUpdate::progress(Some(9.0), 7.0)));
        }
        assert_eq!(job.deliver(), 2);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (JobStatus::Converting, 2.0, Some(3.0)),
                (JobStatus::Converting, 5.0, Some(0.0)),
            ]
        );
        assert_eq!(job.duration(), Some(5.0));
    }

    #[test]
    fn test_late_duration_never_lowers_progress() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir);
        job.state().status = JobStatus::Converting;
        std::fs::write(job.temp_output(), "blank").unwrap();
        let seen = recorder(&job);

        {
            let mut state = job.state();
            state
                .pending
                .push_back(JobEvent::Update(StatusUpdate::progress(None, 7.0)));
            state.pending.push_back(JobEvent::Update(StatusUpdate {
                duration: Some(5.0),
                ..Default::default()
            }));
            state
                .pending
                .push_back(JobEvent::Exited(ExitOutcome::with_code(0)));
        }
        assert_eq!(job.deliver(), 2);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (JobStatus::Converting, 7.0, None),
                (JobStatus::Finished, 7.0, Some(0.0)),
            ]
        );
        assert_eq!(job.duration(), Some(7.0));
    }

    #[test]
    fn test_duration_only_update_is_reported_with_next_progress() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir);
        job.state().status = JobStatus::Converting;
        let seen = recorder(&job);

        {
            let mut state = job.state();
            state
                .pending
                .push_back(JobEvent::Update(StatusUpdate::progress(None, 2.0)));
            state.pending.push_back(JobEvent::Update(StatusUpdate {
                duration: Some(5.0),
                ..Default::default()
            }));
        }
        assert_eq!(job.deliver(), 1);
        assert_eq!(job.duration(), Some(5.0));

        job.state()
            .pending
            .push_back(JobEvent::Update(StatusUpdate::progress(None, 3.0)));
        assert_eq!(job.deliver(), 1);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (JobStatus::Converting, 2.0, None),
                (JobStatus::Converting, 3.0, Some(2.0)),
            ]
        );
    }

    #[test]
    fn test_success_exit_moves_output() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir);
        job.state().status = JobStatus::Converting;
        std::fs::write(job.temp_output(), "blank").unwrap();

        job.state()
            .pending
            .push_back(JobEvent::Update(StatusUpdate::progress(Some(4.0), 3.0)));
        job.state()
            .pending
            .push_back(JobEvent::Exited(ExitOutcome::with_code(0)));
        assert_eq!(job.deliver(), 2);

        assert_eq!(job.status(), JobStatus::Finished);
        assert_eq!(job.progress(), 4.0);
        assert_eq!(job.eta(), Some(0.0));
        assert_eq!(job.progress_percent(), 1.0);
        assert!(!job.temp_output().exists());
        assert_eq!(std::fs::read_to_string(job.output()).unwrap(), "blank");
    }

    #[test]
    fn test_success_exit_without_output_fails() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir);
        job.state().status = JobStatus::Converting;
        job.state()
            .pending
            .push_back(JobEvent::Exited(ExitOutcome::with_code(0)));
        job.deliver();

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error().as_deref(), Some("Conversion produced no output"));
    }

    #[test]
    fn test_explicit_failure_ignores_later_events() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir);
        job.state().status = JobStatus::Converting;
        std::fs::write(job.temp_output(), "partial").unwrap();
        let seen = recorder(&job);

        job.state()
            .pending
            .push_back(JobEvent::Update(StatusUpdate::failed("test error")));
        job.state()
            .pending
            .push_back(JobEvent::Exited(ExitOutcome::with_code(0)));
        assert_eq!(job.deliver(), 1);

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error().as_deref(), Some("test error"));
        assert!(!job.temp_output().exists());
        assert!(!job.output().exists());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_listen_after_terminal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir);
        job.record_launch_failure("\"/missing\" does not exist".to_string());
        assert_eq!(job.deliver(), 1);

        let err = job.listen(|_| {}).unwrap_err();
        assert!(matches!(err, ConversionError::JobFinished { .. }));
    }

    #[test]
    fn test_unlisten_stops_notifications() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir);
        job.state().status = JobStatus::Converting;
        let count = Arc::new(StdMutex::new(0));
        let sink = Arc::clone(&count);
        let id = job.listen(move |_| *sink.lock().unwrap() += 1).unwrap();

        job.state()
            .pending
            .push_back(JobEvent::Update(StatusUpdate::progress(Some(2.0), 1.0)));
        job.deliver();
        assert!(job.unlisten(id));
        assert!(!job.unlisten(id));

        job.state()
            .pending
            .push_back(JobEvent::Update(StatusUpdate::progress(None, 2.0)));
        job.deliver();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_identity_equality() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir);
        let other = job_in(&dir);
        assert_eq!(job, job.clone());
        assert_ne!(job, other);
    }
}
