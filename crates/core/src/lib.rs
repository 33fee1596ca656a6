//! mediamill core: batch media conversion over a dual-engine dispatcher.
//!
//! The two pieces that matter live in [`engine`] (capability probe, engine
//! selection, subprocess bridging, progress scraping) and [`queue`] (the
//! sequential batch job queue with pause/resume/retry). Everything else is
//! configuration, metrics, and test plumbing around them.

pub mod config;
pub mod engine;
pub mod metrics;
pub mod queue;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    ServerConfig,
};
pub use engine::{
    BundledEngine, ConversionOutput, ConversionRequest, EngineCapability, EngineConfig,
    EngineDispatcher, EngineError, EngineKind, InProcessEngine, JobRequirements, ProgressEvent,
};
pub use queue::{
    ConversionRecipe, JobQueue, JobState, JobView, QueueError, QueueEvent, QueueSummary,
    SourceFile,
};
