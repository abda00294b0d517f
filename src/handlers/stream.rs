use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::controller::{StatusSnapshot, StreamStatus};
use crate::error::ControlError;
use crate::pipeline::{StartRequest, StreamConfig};
use crate::state::ServerState;

/// Acknowledgement for start and stop
#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Body of every failed control request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MuteResponse {
    pub muted: bool,
}

/// Response polled by the control panel
#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<String>,
    pub status: StreamStatus,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            ok: false,
            error: message.into(),
        }),
    )
}

fn control_error(e: ControlError) -> ApiError {
    let status = match &e {
        ControlError::Config(_) => StatusCode::BAD_REQUEST,
        ControlError::NotRunning => StatusCode::CONFLICT,
        ControlError::Startup(_) | ControlError::Signal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Control request failed: {}", e);
    } else {
        warn!("Control request rejected: {}", e);
    }
    api_error(status, e.to_string())
}

/// Start (or restart) the relay
pub async fn start_stream(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| {
        warn!("Rejected start request body: {}", e);
        api_error(StatusCode::BAD_REQUEST, e.body_text())
    })?;

    let config = StreamConfig::try_from(request).map_err(control_error)?;
    info!(
        "Start requested: {} ({}, {} fps, {} destination(s))",
        config.source_url,
        config.aspect_profile,
        config.frame_rate,
        1 + usize::from(config.secondary_destination_url.is_some())
    );

    state.controller.start(config).map_err(control_error)?;

    Ok(Json(OkResponse { ok: true }))
}

/// Stop the relay; succeeds whether or not anything was running
pub async fn stop_stream(State(state): State<Arc<ServerState>>) -> Json<OkResponse> {
    state.controller.stop();
    Json(OkResponse { ok: true })
}

/// Toggle the audio of the running relay
pub async fn toggle_mute(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<MuteResponse>, ApiError> {
    let muted = state.controller.toggle_mute().map_err(control_error)?;
    Ok(Json(MuteResponse { muted }))
}

pub async fn get_logs(State(state): State<Arc<ServerState>>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: state.controller.get_logs(),
        status: state.controller.get_status(),
    })
}

pub async fn get_status(State(state): State<Arc<ServerState>>) -> Json<StatusSnapshot> {
    Json(state.controller.snapshot())
}
