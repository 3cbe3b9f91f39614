//! Mock process runner for testing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::conversion::{ExitOutcome, LaunchError, ProcessEvent, ProcessRunner, RunningProcess};

/// What a scripted process emits.
///
/// Each inner batch is what one call to `check_notifications` sees; an empty
/// batch means "no new output this poll".
#[derive(Debug, Clone, Default)]
pub struct ProcessScript {
    pub batches: Vec<Vec<ProcessEvent>>,
    /// Written to the last argument when a successful exit is delivered.
    pub output_contents: Option<String>,
    /// Polls between `terminate` and the reported exit.
    pub exit_delay: usize,
}

/// A recorded launch for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedLaunch {
    pub executable: PathBuf,
    pub args: Vec<String>,
    terminated: Arc<AtomicBool>,
}

impl RecordedLaunch {
    /// Whether the manager asked this process to stop.
    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// Mock implementation of the ProcessRunner trait.
///
/// Scripts are consumed in launch order. A launch with no script left gets a
/// process that stays silent until terminated. Executables must exist, as
/// with the real runner.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    scripts: Arc<Mutex<VecDeque<ProcessScript>>>,
    launches: Arc<Mutex<Vec<RecordedLaunch>>>,
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the events of the next launched process.
    pub fn push_script(&self, batches: Vec<Vec<ProcessEvent>>) {
        self.push(ProcessScript {
            batches,
            ..Default::default()
        });
    }

    /// Queue a process that writes `contents` to its output on success.
    pub fn push_script_with_output(&self, batches: Vec<Vec<ProcessEvent>>, contents: &str) {
        self.push(ProcessScript {
            batches,
            output_contents: Some(contents.to_string()),
            ..Default::default()
        });
    }

    pub fn push(&self, script: ProcessScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Get all recorded launches.
    pub fn launches(&self) -> Vec<RecordedLaunch> {
        self.launches.lock().unwrap().clone()
    }
}

impl ProcessRunner for MockRunner {
    fn launch(
        &self,
        executable: &Path,
        args: &[String],
    ) -> Result<Box<dyn RunningProcess>, LaunchError> {
        if !executable.exists() {
            return Err(LaunchError::NotFound {
                path: executable.to_path_buf(),
            });
        }

        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let terminated = Arc::new(AtomicBool::new(false));
        self.launches.lock().unwrap().push(RecordedLaunch {
            executable: executable.to_path_buf(),
            args: args.to_vec(),
            terminated: Arc::clone(&terminated),
        });

        let output = match (script.output_contents, args.last()) {
            (Some(contents), Some(path)) => Some((PathBuf::from(path), contents)),
            _ => None,
        };

        Ok(Box::new(ScriptedProcess {
            batches: script.batches.into_iter().map(VecDeque::from).collect(),
            output,
            terminated,
            exit_delay: script.exit_delay,
            exit_reported: false,
        }))
    }
}

/// A process replaying a [`ProcessScript`].
#[derive(Debug)]
pub struct ScriptedProcess {
    batches: VecDeque<VecDeque<ProcessEvent>>,
    output: Option<(PathBuf, String)>,
    terminated: Arc<AtomicBool>,
    exit_delay: usize,
    exit_reported: bool,
}

impl RunningProcess for ScriptedProcess {
    fn try_next_event(&mut self) -> Option<ProcessEvent> {
        if self.exit_reported {
            return None;
        }

        if self.terminated.load(Ordering::SeqCst) {
            if self.exit_delay > 0 {
                self.exit_delay -= 1;
                return None;
            }
            self.exit_reported = true;
            return Some(ProcessEvent::Exited(ExitOutcome::default()));
        }

        let batch = self.batches.front_mut()?;
        let Some(event) = batch.pop_front() else {
            self.batches.pop_front();
            return None;
        };

        if let ProcessEvent::Exited(outcome) = &event {
            self.exit_reported = true;
            if outcome.success() {
                if let Some((path, contents)) = self.output.take() {
                    let _ = std::fs::write(path, contents);
                }
            }
        }
        Some(event)
    }

    fn terminate(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    fn id(&self) -> Option<u32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> ProcessEvent {
        ProcessEvent::Line(text.to_string())
    }

    fn current_exe() -> PathBuf {
        std::env::current_exe().unwrap()
    }

    #[test]
    fn test_batches_split_polls() {
        let runner = MockRunner::new();
        runner.push_script(vec![vec![line("a"), line("b")], vec![], vec![line("c")]]);
        let mut process = runner.launch(&current_exe(), &[]).unwrap();

        assert_eq!(process.try_next_event(), Some(line("a")));
        assert_eq!(process.try_next_event(), Some(line("b")));
        assert_eq!(process.try_next_event(), None);
        // empty batch: nothing this poll
        assert_eq!(process.try_next_event(), None);
        assert_eq!(process.try_next_event(), Some(line("c")));
        assert_eq!(process.try_next_event(), None);
        assert_eq!(process.try_next_event(), None);
    }

    #[test]
    fn test_missing_executable() {
        let runner = MockRunner::new();
        let result = runner.launch(Path::new("/no/such/tool"), &[]);
        assert!(matches!(result, Err(LaunchError::NotFound { .. })));
        assert!(runner.launches().is_empty());
    }

    #[test]
    fn test_success_exit_writes_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.fake");
        let runner = MockRunner::new();
        runner.push_script_with_output(
            vec![vec![ProcessEvent::Exited(ExitOutcome::with_code(0))]],
            "blank",
        );
        let mut process = runner
            .launch(&current_exe(), &[out.to_string_lossy().into_owned()])
            .unwrap();

        assert!(matches!(
            process.try_next_event(),
            Some(ProcessEvent::Exited(_))
        ));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "blank");
    }

    #[test]
    fn test_terminate_reports_exit_once() {
        let runner = MockRunner::new();
        let mut process = runner.launch(&current_exe(), &[]).unwrap();
        process.terminate();

        assert_eq!(
            process.try_next_event(),
            Some(ProcessEvent::Exited(ExitOutcome::default()))
        );
        assert_eq!(process.try_next_event(), None);
        assert!(runner.launches()[0].was_terminated());
    }
}
