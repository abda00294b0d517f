use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::log_buffer::DEFAULT_LOG_CAPACITY;
use crate::pipeline::{PipelineSettings, StreamConfig};
use crate::process::ExitReport;

/// Visible lifecycle state of the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamStatus {
    /// Nothing has been started yet
    #[default]
    Idle,
    /// A pipeline process is held by the controller
    Streaming,
    /// Stopped by an operator
    Stopped,
    /// The pipeline exited on its own (only with exit detection enabled)
    Crashed,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamStatus::Idle => write!(f, "Idle"),
            StreamStatus::Streaming => write!(f, "Streaming"),
            StreamStatus::Stopped => write!(f, "Stopped"),
            StreamStatus::Crashed => write!(f, "Crashed"),
        }
    }
}

/// How muting is applied to a live pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuteStrategy {
    /// Terminate and relaunch the pipeline with audio dropped or restored
    #[default]
    RestartPipeline,
    /// Send the toggle signal to the running pipeline
    SignalLiveProcess,
}

impl fmt::Display for MuteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuteStrategy::RestartPipeline => write!(f, "restart"),
            MuteStrategy::SignalLiveProcess => write!(f, "signal"),
        }
    }
}

impl FromStr for MuteStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "restart" | "restart_pipeline" => Ok(MuteStrategy::RestartPipeline),
            "signal" | "signal_live_process" => Ok(MuteStrategy::SignalLiveProcess),
            other => Err(format!(
                "unknown mute strategy '{}' (expected restart or signal)",
                other
            )),
        }
    }
}

/// Controller behaviour fixed at startup
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub mute_strategy: MuteStrategy,
    pub log_capacity: usize,
    /// Promote a self-terminated pipeline to `Crashed` instead of leaving `Streaming` stale
    pub detect_exit: bool,
    pub pipeline: PipelineSettings,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            mute_strategy: MuteStrategy::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            detect_exit: true,
            pipeline: PipelineSettings::default(),
        }
    }
}

/// Point-in-time view of the controller for `GET /status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: StreamStatus,
    pub muted: bool,
    pub mute_strategy: MuteStrategy,
    pub pid: Option<u32>,
    pub run_id: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_exit: Option<ExitReport>,
    /// Active or last-used configuration, stream keys masked
    pub config: Option<StreamConfig>,
    pub log_lines: usize,
    /// Lines of the current run dropped from the front of the log
    pub logs_evicted: u64,
}
