//! Engine module: dual-engine conversion dispatch.
//!
//! Two engines can run a conversion:
//!
//! - the **in-process engine**, a transcoder addressed through a private
//!   named workspace ([`InProcessEngine`]), always assumed available;
//! - the **external engine**, a system transcoder binary invoked as a
//!   subprocess, discovered by a one-shot capability probe at startup.
//!
//! [`EngineDispatcher`] presents both behind one call signature so the job
//! queue stays engine-agnostic, and publishes best-effort progress events
//! scraped from the external engine's diagnostic stream.

mod capability;
mod config;
mod dispatch;
mod error;
mod external;
mod inprocess;
mod progress;
mod types;

pub use capability::{resolve_external_binary, EngineCapability};
pub use config::EngineConfig;
pub use dispatch::EngineDispatcher;
pub use error::EngineError;
pub use external::ExternalEngine;
pub use inprocess::{BundledEngine, InProcessEngine};
pub use progress::ProgressParser;
pub use types::{
    ConversionOutput, ConversionRequest, EngineKind, JobRequirements, ProgressEvent,
};
