//! Queue and job endpoints.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use mediamill_core::{ConversionRecipe, JobView, QueueError, QueueSummary, SourceFile};

use crate::state::AppState;

/// Error envelope shared by all queue endpoints.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        let status = match e {
            QueueError::JobNotFound(_) => StatusCode::NOT_FOUND,
            QueueError::JobProcessing(_) | QueueError::InvalidState { .. } => StatusCode::CONFLICT,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// `POST /jobs` — multipart upload: an `options` part holding a
/// [`ConversionRecipe`] as JSON, plus one or more `file` parts. One job is
/// enqueued per file; processing does not start automatically.
pub async fn create_jobs(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<JobView>>), ApiError> {
    let mut recipe: Option<ConversionRecipe> = None;
    let mut files: Vec<SourceFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("options") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("unreadable options: {e}")))?;
                let parsed: ConversionRecipe = serde_json::from_str(&raw)
                    .map_err(|e| ApiError::bad_request(format!("invalid options: {e}")))?;
                recipe = Some(parsed);
            }
            Some("file") => {
                let name = field
                    .file_name()
                    .map(str::to_owned)
                    .unwrap_or_else(|| "upload".to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("unreadable file: {e}")))?;
                files.push(SourceFile::new(name, data.to_vec()));
            }
            other => {
                debug!(field = ?other, "ignoring unknown multipart field");
            }
        }
    }

    let recipe = recipe.ok_or_else(|| ApiError::bad_request("missing options part"))?;
    if recipe.output_extension.is_empty() {
        return Err(ApiError::bad_request("options.output_extension is required"));
    }
    if files.is_empty() {
        return Err(ApiError::bad_request("no file parts in upload"));
    }

    let mut views = Vec::with_capacity(files.len());
    for file in files {
        views.push(state.queue().enqueue(file, recipe.clone()).await);
    }
    Ok((StatusCode::CREATED, Json(views)))
}

pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobView>> {
    Json(state.queue().jobs().await)
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
    state
        .queue()
        .job(id)
        .await
        .map(Json)
        .ok_or_else(|| QueueError::JobNotFound(id).into())
}

/// Reduces a user-supplied filename to something safe inside a quoted
/// `Content-Disposition` value: printable ASCII with quotes and backslashes
/// dropped, a fixed name when nothing survives.
fn header_safe_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && *c != '"' && *c != '\\')
        .collect();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}

/// `GET /jobs/{id}/result` — downloads the produced bytes.
pub async fn download_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let handle = state.queue().result(id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        header_safe_filename(&handle.filename)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        handle.data.as_slice().to_vec(),
    )
        .into_response())
}

pub async fn remove_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.queue().remove_job(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn retry_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
    Ok(Json(state.queue().retry_job(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub index: usize,
}

pub async fn move_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<MoveRequest>,
) -> Result<StatusCode, ApiError> {
    state.queue().move_job(id, body.index).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct DriveStatus {
    pub driving: bool,
    pub paused: bool,
}

pub async fn start_queue(State(state): State<Arc<AppState>>) -> Json<DriveStatus> {
    state.queue().start_processing();
    Json(DriveStatus {
        driving: state.queue().is_driving(),
        paused: state.queue().is_paused(),
    })
}

pub async fn pause_queue(State(state): State<Arc<AppState>>) -> Json<DriveStatus> {
    state.queue().pause_processing();
    Json(DriveStatus {
        driving: state.queue().is_driving(),
        paused: state.queue().is_paused(),
    })
}

pub async fn queue_summary(State(state): State<Arc<AppState>>) -> Json<QueueSummary> {
    Json(state.queue().summary().await)
}

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub removed: usize,
}

pub async fn clear_completed(State(state): State<Arc<AppState>>) -> Json<ClearedResponse> {
    Json(ClearedResponse {
        removed: state.queue().clear_completed().await,
    })
}

pub async fn clear_all(State(state): State<Arc<AppState>>) -> Json<ClearedResponse> {
    Json(ClearedResponse {
        removed: state.queue().clear_all().await,
    })
}
