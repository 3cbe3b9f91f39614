//! Launching converter processes and reading their output without blocking.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::oneshot;

use super::error::LaunchError;

/// Something observed about a running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// One line of standard output, without the trailing newline.
    Line(String),
    /// The process exited. Always the last event.
    Exited(ExitOutcome),
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExitOutcome {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    /// Last non-empty line written to standard error.
    pub stderr_tail: Option<String>,
}

impl ExitOutcome {
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            stderr_tail: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best available description of a failed exit.
    pub fn describe_failure(&self) -> String {
        if let Some(tail) = &self.stderr_tail {
            return tail.clone();
        }
        match self.code {
            Some(code) => format!("Conversion exited with code {}", code),
            None => "Conversion was terminated by a signal".to_string(),
        }
    }
}

/// Handle to a launched process.
///
/// Events are buffered until asked for; `try_next_event` never blocks.
pub trait RunningProcess: Send {
    /// Returns the next buffered event, or `None` when nothing new arrived.
    fn try_next_event(&mut self) -> Option<ProcessEvent>;

    /// Requests early shutdown. Does not wait for the process to exit.
    fn terminate(&mut self);

    /// OS process id, when known.
    fn id(&self) -> Option<u32>;
}

/// Launches converter processes.
pub trait ProcessRunner: Send + Sync {
    fn launch(
        &self,
        executable: &Path,
        args: &[String],
    ) -> Result<Box<dyn RunningProcess>, LaunchError>;
}

/// Resolves bare program names on `PATH`; other paths are returned unchanged.
pub fn resolve_executable(path: &Path) -> Result<PathBuf, LaunchError> {
    let is_bare_name = !path.is_absolute() && path.components().count() == 1;
    if !is_bare_name {
        return Ok(path.to_path_buf());
    }
    which::which(path).map_err(|_| LaunchError::NotFound {
        path: path.to_path_buf(),
    })
}

/// Checks that `path` names an existing, executable file.
pub fn check_executable(path: &Path) -> Result<(), LaunchError> {
    let metadata = std::fs::metadata(path).map_err(|_| LaunchError::NotFound {
        path: path.to_path_buf(),
    })?;

    if !metadata.is_file() {
        return Err(LaunchError::NotExecutable {
            path: path.to_path_buf(),
        });
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(LaunchError::NotExecutable {
                path: path.to_path_buf(),
            });
        }
    }

    Ok(())
}

/// [`ProcessRunner`] backed by `tokio::process`.
///
/// Each process gets a small task that forwards stdout lines and the exit
/// outcome into a channel. Nothing reaches a job until the manager drains it.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    handle: Handle,
}

impl TokioProcessRunner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl ProcessRunner for TokioProcessRunner {
    fn launch(
        &self,
        executable: &Path,
        args: &[String],
    ) -> Result<Box<dyn RunningProcess>, LaunchError> {
        let path = resolve_executable(executable)?;
        check_executable(&path)?;

        let _guard = self.handle.enter();
        let mut child = Command::new(&path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => LaunchError::NotFound { path: path.clone() },
                std::io::ErrorKind::PermissionDenied => {
                    LaunchError::NotExecutable { path: path.clone() }
                }
                _ => LaunchError::Spawn {
                    path: path.clone(),
                    source: e,
                },
            })?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        tracing::debug!(?path, ?pid, "Launched converter process");
        self.handle
            .spawn(supervise(child, stdout, stderr, event_tx, kill_rx));

        Ok(Box::new(TokioProcess {
            events: event_rx,
            kill: Some(kill_tx),
            pid,
            exited: false,
        }))
    }
}

async fn supervise(
    mut child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    let stderr_task = stderr.map(|stderr| tokio::spawn(last_line(stderr)));
    let mut killed = false;

    if let Some(stdout) = stdout {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => match read {
                    Ok(0) => break,
                    Ok(_) => {
                        // Receiver gone means nobody cares about the rest.
                        let _ = events.send(ProcessEvent::Line(decode_line(&buf)));
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Stopped reading converter output");
                        break;
                    }
                },
                _ = &mut kill_rx, if !killed => {
                    let _ = child.start_kill();
                    killed = true;
                }
            }
        }
    }

    let status = tokio::select! {
        status = child.wait() => status,
        _ = &mut kill_rx, if !killed => {
            let _ = child.start_kill();
            child.wait().await
        }
    };

    let stderr_tail = match stderr_task {
        Some(task) => task.await.ok().flatten(),
        None => None,
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to wait for converter process");
            None
        }
    };

    let _ = events.send(ProcessEvent::Exited(ExitOutcome { code, stderr_tail }));
}

async fn last_line(stderr: ChildStderr) -> Option<String> {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut last = None;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = decode_line(&buf);
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    last = Some(trimmed.to_string());
                }
            }
        }
    }
    last
}

/// Converters print whatever their input metadata holds, so output is not
/// guaranteed to be UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

struct TokioProcess {
    events: mpsc::UnboundedReceiver<ProcessEvent>,
    kill: Option<oneshot::Sender<()>>,
    pid: Option<u32>,
    exited: bool,
}

impl RunningProcess for TokioProcess {
    fn try_next_event(&mut self) -> Option<ProcessEvent> {
        if self.exited {
            return None;
        }
        match self.events.try_recv() {
            Ok(event) => {
                if matches!(event, ProcessEvent::Exited(_)) {
                    self.exited = true;
                }
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                // The supervising task died before reporting an exit.
                self.exited = true;
                Some(ProcessEvent::Exited(ExitOutcome {
                    code: None,
                    stderr_tail: Some("Lost track of converter process".to_string()),
                }))
            }
        }
    }

    fn terminate(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }

    fn id(&self) -> Option<u32> {
        self.pid
    }
}
