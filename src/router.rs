use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    control_panel, get_logs, get_status, health_check, start_stream, stop_stream, toggle_mute,
};
use crate::state::ServerState;

/// Start requests are a handful of short strings
const MAX_API_BODY_SIZE: usize = 64 * 1024;

pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors_origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/", get(control_panel))
        .route("/start", post(start_stream))
        .route("/stop", post(stop_stream))
        .route("/mute", post(toggle_mute))
        .route("/logs", get(get_logs))
        .route("/status", get(get_status))
        .route("/health", get(health_check))
        .layer(RequestBodyLimitLayer::new(MAX_API_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod router_tests;
