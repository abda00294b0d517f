// Pipeline lifecycle controller
//
// Owns the single pipeline slot and its visible state:
// - start / stop / mute transitions, serialized by one state mutex
// - one background task per run draining stderr into the rolling log
// - optional exit detection that marks a self-terminated run as crashed

mod drain;
mod log_buffer;
mod types;

pub use drain::{drain_diagnostics, DiagnosticLineCodec, MAX_LINE_BYTES};
pub use log_buffer::{LogBuffer, DEFAULT_LOG_CAPACITY};
pub use types::{ControllerOptions, MuteStrategy, StatusSnapshot, StreamStatus};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::pipeline::{build_pipeline, StreamConfig};
use crate::process::{ExitReport, PipelineHandle, PipelineSignal, ProcessLauncher};

/// The pipeline currently owned by the controller
struct ActiveRun {
    run_id: u64,
    handle: Box<dyn PipelineHandle>,
    muted: bool,
    started_at: DateTime<Utc>,
    drain_cancel: CancellationToken,
}

impl ActiveRun {
    fn terminate(&self) {
        if let Err(e) = self.handle.signal(PipelineSignal::Terminate) {
            warn!("Failed to terminate run {}: {}", self.run_id, e);
        }
    }
}

#[derive(Default)]
struct ControllerState {
    status: StreamStatus,
    active: Option<ActiveRun>,
    last_config: Option<StreamConfig>,
    last_exit: Option<ExitReport>,
    last_run_id: u64,
}

/// Owns at most one running pipeline and the log of its diagnostic output
pub struct PipelineController {
    launcher: Arc<dyn ProcessLauncher>,
    options: ControllerOptions,
    logs: Arc<LogBuffer>,
    state: Arc<Mutex<ControllerState>>,
}

impl PipelineController {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, options: ControllerOptions) -> Self {
        let logs = Arc::new(LogBuffer::new(options.log_capacity));
        Self {
            launcher,
            options,
            logs,
            state: Arc::new(Mutex::new(ControllerState::default())),
        }
    }

    /// Replace whatever is running with a fresh, unmuted pipeline for `config`.
    ///
    /// The previous pipeline is signaled to terminate without waiting for it, and the log is
    /// cleared before the new one is launched.
    pub fn start(&self, config: StreamConfig) -> ControlResult<()> {
        let mut state = self.state.lock();
        self.launch_locked(&mut state, config, false)
    }

    /// Gracefully terminate the running pipeline, if any. Always succeeds.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        match state.active.take() {
            Some(run) => {
                info!("Stopping run {}", run.run_id);
                // The drain task keeps collecting shutdown output until the pipe closes
                run.terminate();
            }
            None => debug!("Stop requested with no pipeline running"),
        }
        state.status = StreamStatus::Stopped;
    }

    /// Flip the audio of the running pipeline and return the new muted flag
    pub fn toggle_mute(&self) -> ControlResult<bool> {
        let mut state = self.state.lock();
        let currently_muted = match state.active.as_ref() {
            Some(run) => run.muted,
            None => return Err(ControlError::NotRunning),
        };
        let muted = !currently_muted;

        match self.options.mute_strategy {
            MuteStrategy::RestartPipeline => {
                let config = state
                    .last_config
                    .clone()
                    .ok_or(ControlError::NotRunning)?;
                info!("Restarting pipeline with muted={}", muted);
                self.launch_locked(&mut state, config, muted)?;
            }
            MuteStrategy::SignalLiveProcess => {
                if let Some(run) = state.active.as_mut() {
                    run.handle
                        .signal(PipelineSignal::ToggleAudio)
                        .map_err(|e| ControlError::Signal(e.to_string()))?;
                    run.muted = muted;
                    info!("Signaled run {} to set muted={}", run.run_id, muted);
                }
            }
        }

        Ok(muted)
    }

    pub fn get_status(&self) -> StreamStatus {
        self.state.lock().status
    }

    /// Retained log lines, oldest first
    pub fn get_logs(&self) -> Vec<String> {
        self.logs.snapshot()
    }

    pub fn is_muted(&self) -> bool {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|run| run.muted)
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.state.lock();
        let active = state.active.as_ref();
        StatusSnapshot {
            status: state.status,
            muted: active.map(|run| run.muted).unwrap_or(false),
            mute_strategy: self.options.mute_strategy,
            pid: active.and_then(|run| run.handle.pid()),
            run_id: active.map(|run| run.run_id),
            started_at: active.map(|run| run.started_at),
            last_exit: state.last_exit,
            config: state.last_config.as_ref().map(StreamConfig::redacted),
            log_lines: self.logs.len(),
            logs_evicted: self.logs.evicted(),
        }
    }

    fn launch_locked(
        &self,
        state: &mut ControllerState,
        config: StreamConfig,
        muted: bool,
    ) -> ControlResult<()> {
        // Invalid configuration must not disturb the running pipeline
        let spec = build_pipeline(&config, muted, &self.options.pipeline)?;

        let replaced = match state.active.take() {
            Some(run) => {
                info!("Replacing run {}", run.run_id);
                run.drain_cancel.cancel();
                run.terminate();
                true
            }
            None => false,
        };

        state.last_run_id += 1;
        let run_id = state.last_run_id;
        self.logs.reset(run_id);
        // Echo the command with stream keys masked so the log pane shows what ran
        if let Ok(shown) = build_pipeline(&config.redacted(), muted, &self.options.pipeline) {
            self.logs.push(
                run_id,
                format!("[relay] launching: {}", shown.to_shell_script()),
            );
        }

        let launched = match self.launcher.launch(&spec) {
            Ok(launched) => launched,
            Err(e) => {
                error!("Run {} failed to launch: {}", run_id, e);
                self.logs
                    .push(run_id, format!("[relay] failed to launch pipeline: {}", e));
                if replaced {
                    state.status = StreamStatus::Stopped;
                }
                return Err(ControlError::Startup(e.to_string()));
            }
        };

        let pid = launched.handle.pid();
        let drain_cancel = CancellationToken::new();
        self.spawn_run_task(
            run_id,
            launched.diagnostics,
            launched.exited,
            drain_cancel.clone(),
        );

        state.active = Some(ActiveRun {
            run_id,
            handle: launched.handle,
            muted,
            started_at: Utc::now(),
            drain_cancel,
        });
        state.status = StreamStatus::Streaming;
        state.last_config = Some(config);
        state.last_exit = None;

        info!(
            "Run {} streaming (pid {:?}, muted {}, {} sink(s))",
            run_id,
            pid,
            muted,
            spec.sinks.len()
        );
        Ok(())
    }

    fn spawn_run_task(
        &self,
        run_id: u64,
        diagnostics: Box<dyn AsyncRead + Send + Unpin>,
        exited: oneshot::Receiver<ExitReport>,
        cancel: CancellationToken,
    ) {
        let logs = self.logs.clone();
        let state = self.state.clone();
        let detect_exit = self.options.detect_exit;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Run {} drain abandoned", run_id);
                    return;
                }
                lines = drain_diagnostics(diagnostics, &logs, run_id) => {
                    debug!("Run {} diagnostic stream closed after {} lines", run_id, lines);
                }
            }

            let report = tokio::select! {
                _ = cancel.cancelled() => return,
                report = exited => match report {
                    Ok(report) => report,
                    Err(_) => return,
                },
            };

            record_exit(&state, &logs, run_id, report, detect_exit);
        });
    }
}

fn record_exit(
    state: &Mutex<ControllerState>,
    logs: &LogBuffer,
    run_id: u64,
    report: ExitReport,
    detect_exit: bool,
) {
    let outcome = if report.success() { "finished" } else { "exited" };
    logs.push(run_id, format!("[relay] pipeline {} ({})", outcome, report));

    let mut state = state.lock();
    if state.last_run_id == run_id {
        state.last_exit = Some(report);
    }

    let is_current = state
        .active
        .as_ref()
        .is_some_and(|run| run.run_id == run_id);
    if !is_current {
        debug!("Run {} exited after being stopped: {}", run_id, report);
        return;
    }

    if detect_exit {
        if report.success() {
            info!("Run {} finished: {}", run_id, report);
        } else {
            warn!("Run {} exited on its own: {}", run_id, report);
        }
        state.active = None;
        state.status = StreamStatus::Crashed;
    } else {
        warn!(
            "Run {} exited on its own ({}), status left at {}",
            run_id, report, state.status
        );
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if let Some(run) = self.state.lock().active.take() {
            run.drain_cancel.cancel();
            run.terminate();
            info!("PipelineController dropped, run {} terminated", run.run_id);
        }
    }
}
