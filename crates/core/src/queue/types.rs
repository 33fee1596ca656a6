//! Types for the batch job queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::JobRequirements;

/// Errors for direct queue mutations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No job with this id.
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// The job is currently processing; the operation is rejected.
    #[error("job is processing: {0}")]
    JobProcessing(Uuid),

    /// The job is not in a state the operation applies to.
    #[error("job {id} is {actual}, expected {expected}")]
    InvalidState {
        id: Uuid,
        expected: &'static str,
        actual: JobState,
    },
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for the drive loop to pick it up.
    Pending,
    /// Being converted right now; at most one job queue-wide.
    Processing,
    /// Finished with a result available for download.
    Completed,
    /// Finished with a diagnostic; terminal absent a user retry.
    Error,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// The input payload a job owns until it reaches a terminal state.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub data: Arc<Vec<u8>>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(data),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// How a job is converted: the transcoder arguments between input and
/// output, the produced extension, and the engine demands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionRecipe {
    /// Arguments placed between `-i <input>` and the output name,
    /// e.g. `["-c:v", "libx264", "-crf", "23"]`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Output extension without the dot.
    pub output_extension: String,
    /// Engine demands for this job.
    #[serde(default)]
    pub requirements: JobRequirements,
}

/// The produced output of a completed job.
#[derive(Debug, Clone)]
pub struct ResultHandle {
    pub filename: String,
    pub data: Arc<Vec<u8>>,
}

impl ResultHandle {
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// One user-requested conversion tracked through the queue.
///
/// `result` and `error_detail` are mutually exclusive; both are empty
/// outside the `completed`/`error` states.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: Uuid,
    pub source: SourceFile,
    pub recipe: ConversionRecipe,
    pub state: JobState,
    pub progress_percent: u8,
    pub result: Option<ResultHandle>,
    pub error_detail: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl ConversionJob {
    pub fn new(source: SourceFile, recipe: ConversionRecipe) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            recipe,
            state: JobState::Pending,
            progress_percent: 0,
            result: None,
            error_detail: None,
            enqueued_at: Utc::now(),
        }
    }

    /// API-facing view without payload bytes.
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            source_name: self.source.name.clone(),
            source_size_bytes: self.source.size_bytes(),
            state: self.state,
            progress_percent: self.progress_percent,
            error_detail: self.error_detail.clone(),
            result_filename: self.result.as_ref().map(|r| r.filename.clone()),
            result_size_bytes: self.result.as_ref().map(|r| r.size_bytes()),
            enqueued_at: self.enqueued_at,
        }
    }
}

/// Serializable job snapshot for the API and event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    pub source_name: String,
    pub source_size_bytes: u64,
    pub state: JobState,
    pub progress_percent: u8,
    pub error_detail: Option<String>,
    pub result_filename: Option<String>,
    pub result_size_bytes: Option<u64>,
    pub enqueued_at: DateTime<Utc>,
}

/// Counts per state across the whole queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
}

/// Events published by the queue for UI/API consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A job changed state or progress.
    JobUpdated { job: JobView },
    /// A job was removed from the queue.
    JobRemoved { id: Uuid },
    /// The drive loop stopped because no pending job remains.
    Idle,
    /// The drive loop stopped because a pause was observed.
    Paused,
}
