//! In-memory launcher for controller and HTTP tests

use bytes::Bytes;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::io::StreamReader;

use super::launcher::{
    ExitReport, LaunchError, LaunchedPipeline, PipelineHandle, PipelineSignal, ProcessLauncher,
};
use crate::pipeline::PipelineSpec;

/// One fake process. Terminating it closes its stderr and reports a SIGTERM exit.
pub struct FakeProcess {
    pub pid: u32,
    pub spec: PipelineSpec,
    stderr: Mutex<Option<mpsc::UnboundedSender<io::Result<Bytes>>>>,
    exit: Mutex<Option<oneshot::Sender<ExitReport>>>,
    signals: Mutex<Vec<PipelineSignal>>,
}

impl FakeProcess {
    /// Write `line` to the process's stderr
    pub fn emit(&self, line: &str) {
        self.emit_raw(format!("{}\n", line).as_bytes());
    }

    pub fn emit_raw(&self, bytes: &[u8]) {
        if let Some(tx) = self.stderr.lock().as_ref() {
            let _ = tx.send(Ok(Bytes::copy_from_slice(bytes)));
        }
    }

    /// Close stderr and report the exit, as if the process died on its own
    pub fn exit(&self, report: ExitReport) {
        self.stderr.lock().take();
        if let Some(tx) = self.exit.lock().take() {
            let _ = tx.send(report);
        }
    }

    pub fn exit_with_code(&self, code: i32) {
        self.exit(ExitReport {
            code: Some(code),
            signal: None,
        });
    }

    pub fn is_alive(&self) -> bool {
        self.exit.lock().is_some()
    }

    pub fn signals(&self) -> Vec<PipelineSignal> {
        self.signals.lock().clone()
    }
}

struct FakeHandle(Arc<FakeProcess>);

impl PipelineHandle for FakeHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.0.pid)
    }

    fn signal(&self, signal: PipelineSignal) -> io::Result<()> {
        self.0.signals.lock().push(signal);
        if signal == PipelineSignal::Terminate {
            self.0.exit(ExitReport {
                code: None,
                signal: Some(15),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    processes: Mutex<Vec<Arc<FakeProcess>>>,
    fail_next: Mutex<Option<String>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next launch fail with a spawn error
    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }

    pub fn launch_count(&self) -> usize {
        self.processes.lock().len()
    }

    pub fn process(&self, index: usize) -> Arc<FakeProcess> {
        self.processes.lock()[index].clone()
    }

    pub fn last(&self) -> Arc<FakeProcess> {
        self.processes
            .lock()
            .last()
            .cloned()
            .expect("no process launched")
    }

    pub fn alive_count(&self) -> usize {
        self.processes.lock().iter().filter(|p| p.is_alive()).count()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, spec: &PipelineSpec) -> Result<LaunchedPipeline, LaunchError> {
        if let Some(message) = self.fail_next.lock().take() {
            return Err(LaunchError::Spawn {
                program: spec.extraction.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, message),
            });
        }

        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        let mut processes = self.processes.lock();
        let process = Arc::new(FakeProcess {
            pid: 1000 + processes.len() as u32,
            spec: spec.clone(),
            stderr: Mutex::new(Some(stderr_tx)),
            exit: Mutex::new(Some(exit_tx)),
            signals: Mutex::new(Vec::new()),
        });
        processes.push(process.clone());

        Ok(LaunchedPipeline {
            handle: Box::new(FakeHandle(process)),
            diagnostics: Box::new(StreamReader::new(UnboundedReceiverStream::new(stderr_rx))),
            exited: exit_rx,
        })
    }
}
