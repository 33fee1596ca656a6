use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, jobs, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload = state.max_upload_bytes();

    let api_routes = Router::new()
        // Health, config, capability
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/capability", get(handlers::get_capability))
        // Jobs
        .route("/jobs", post(jobs::create_jobs))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}", delete(jobs::remove_job))
        .route("/jobs/{id}/result", get(jobs::download_result))
        .route("/jobs/{id}/retry", post(jobs::retry_job))
        .route("/jobs/{id}/move", post(jobs::move_job))
        // Queue controls
        .route("/queue/start", post(jobs::start_queue))
        .route("/queue/pause", post(jobs::pause_queue))
        .route("/queue/summary", get(jobs::queue_summary))
        .route("/queue/completed", delete(jobs::clear_completed))
        .route("/queue", delete(jobs::clear_all))
        // Live updates
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_upload))
}
