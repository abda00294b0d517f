use serde::Serialize;
use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::pipeline::PipelineSpec;

/// Signals the controller sends to a running pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineSignal {
    /// Graceful shutdown (SIGTERM)
    Terminate,
    /// Live audio toggle (SIGUSR1), for pipelines wrapped to handle it
    ToggleAudio,
}

impl PipelineSignal {
    #[cfg(unix)]
    fn as_raw(self) -> libc::c_int {
        match self {
            PipelineSignal::Terminate => libc::SIGTERM,
            PipelineSignal::ToggleAudio => libc::SIGUSR1,
        }
    }
}

/// How a pipeline process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitReport {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitReport {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Handle to a launched pipeline, owned by the controller
pub trait PipelineHandle: Send + Sync {
    fn pid(&self) -> Option<u32>;

    /// Deliver `signal` to the whole pipeline without waiting for it to react.
    /// Signaling a pipeline that has already exited succeeds.
    fn signal(&self, signal: PipelineSignal) -> io::Result<()>;
}

/// Everything the controller needs from a freshly launched pipeline
pub struct LaunchedPipeline {
    pub handle: Box<dyn PipelineHandle>,
    /// The pipeline's diagnostic (stderr) stream
    pub diagnostics: Box<dyn AsyncRead + Send + Unpin>,
    /// Resolves once the process has been reaped
    pub exited: oneshot::Receiver<ExitReport>,
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("pipeline stderr was not captured")]
    MissingStderr,
}

/// Starts pipeline processes. The controller only talks to the OS through this trait.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &PipelineSpec) -> Result<LaunchedPipeline, LaunchError>;
}

/// Runs the rendered pipeline through `<shell> -c` in a process group of its own, so that
/// signals reach both stages and not only the shell.
pub struct ShellLauncher {
    shell: String,
}

impl ShellLauncher {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Spawn `script` and start reaping it in the background. Must run inside a tokio runtime.
    pub fn spawn_script(&self, script: &str) -> Result<LaunchedPipeline, LaunchError> {
        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            program: self.shell.clone(),
            source,
        })?;

        let pid = child.id();
        let stderr = child.stderr.take().ok_or(LaunchError::MissingStderr)?;
        let exited_flag = Arc::new(AtomicBool::new(false));
        let (exit_tx, exit_rx) = oneshot::channel();

        info!("Pipeline launched (pid {:?})", pid);

        {
            let exited_flag = exited_flag.clone();
            tokio::spawn(async move {
                let report = match child.wait().await {
                    Ok(status) => ExitReport::from(status),
                    Err(e) => {
                        warn!("Failed to wait for pipeline {:?}: {}", pid, e);
                        ExitReport {
                            code: None,
                            signal: None,
                        }
                    }
                };
                exited_flag.store(true, Ordering::SeqCst);
                debug!("Pipeline {:?} reaped: {}", pid, report);
                let _ = exit_tx.send(report);
            });
        }

        Ok(LaunchedPipeline {
            handle: Box::new(ProcessGroupHandle {
                pid,
                exited: exited_flag,
            }),
            diagnostics: Box::new(stderr),
            exited: exit_rx,
        })
    }
}

impl ProcessLauncher for ShellLauncher {
    fn launch(&self, spec: &PipelineSpec) -> Result<LaunchedPipeline, LaunchError> {
        let script = spec.to_shell_script();
        debug!("Pipeline script: {}", script);
        self.spawn_script(&script)
    }
}

/// Signals the process group led by the shell
struct ProcessGroupHandle {
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
}

impl PipelineHandle for ProcessGroupHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[cfg(unix)]
    fn signal(&self, signal: PipelineSignal) -> io::Result<()> {
        // Once reaped the pid may belong to someone else
        if self.exited.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };

        let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal.as_raw()) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(())
        } else {
            Err(err)
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _signal: PipelineSignal) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "pipeline signals require a unix host",
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_spawn_script_captures_stderr() {
        let launcher = ShellLauncher::new("sh");
        let launched = launcher
            .spawn_script("echo first >&2; echo ignored; echo second >&2; exit 3")
            .unwrap();

        assert!(launched.handle.pid().is_some());

        let mut lines = BufReader::new(launched.diagnostics).lines();
        let mut seen = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            seen.push(line);
        }
        assert_eq!(seen, vec!["first", "second"]);

        let report = launched.exited.await.unwrap();
        assert_eq!(report.code, Some(3));
        assert!(!report.success());
    }

    #[tokio::test]
    async fn test_terminate_reaches_process_group() {
        let launcher = ShellLauncher::new("sh");
        let launched = launcher.spawn_script("sleep 30 | sleep 30").unwrap();

        launched.handle.signal(PipelineSignal::Terminate).unwrap();

        let report = tokio::time::timeout(std::time::Duration::from_secs(5), launched.exited)
            .await
            .expect("pipeline should exit after SIGTERM")
            .unwrap();
        assert!(!report.success());

        // Already reaped: signaling again is a no-op
        launched.handle.signal(PipelineSignal::Terminate).unwrap();
    }

    #[test]
    fn test_missing_shell_is_spawn_error() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();

        let launcher = ShellLauncher::new("/nonexistent/shell");
        let err = launcher.spawn_script("true").err().unwrap();
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }
}
