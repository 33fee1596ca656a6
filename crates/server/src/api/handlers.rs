use axum::{extract::State, http::StatusCode, Json};
use once_cell::sync::Lazy;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use mediamill_core::{EngineCapability, SanitizedConfig};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// The session capability snapshot, fixed at startup.
pub async fn get_capability(State(state): State<Arc<AppState>>) -> Json<EngineCapability> {
    Json(state.capability())
}

static METRICS_REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    if let Err(e) = mediamill_core::metrics::register_all(&registry) {
        tracing::error!(error = %e, "failed to register metrics");
    }
    registry
});

pub async fn metrics() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&METRICS_REGISTRY.gather(), &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
