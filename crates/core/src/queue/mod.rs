//! Batch job queue: an ordered list of conversion jobs driven strictly one
//! at a time through the engine dispatcher.

mod queue;
mod types;

pub use queue::JobQueue;
pub use types::{
    ConversionJob, ConversionRecipe, JobState, JobView, QueueError, QueueEvent, QueueSummary,
    ResultHandle, SourceFile,
};
