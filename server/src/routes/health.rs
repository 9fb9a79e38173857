//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" when at least one model is loaded, "unavailable" otherwise
    pub status: String,
    pub models: Vec<String>,
    /// Model configuration file the registry was built from
    pub config_path: String,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let models: Vec<String> = state
        .service
        .registry()
        .map(|registry| registry.crop_keys().into_iter().map(String::from).collect())
        .unwrap_or_default();

    let status = if state.service.is_available() {
        "ok"
    } else {
        "unavailable"
    };

    Json(HealthResponse {
        status: status.to_string(),
        models,
        config_path: state.config.config_path.display().to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
