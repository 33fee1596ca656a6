//! Types for the engine module.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which engine handles a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// The bundled engine running inside this process's private workspace.
    InProcess,
    /// A natively installed transcoder invoked as a child process.
    External,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProcess => write!(f, "in_process"),
            Self::External => write!(f, "external"),
        }
    }
}

/// What a job demands from the engine that runs it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequirements {
    /// The job uses the HAP codec family, which only a system engine
    /// built with the HAP encoder can produce.
    #[serde(default)]
    pub needs_hap: bool,
    /// Prefer the external engine for throughput when it is available.
    #[serde(default)]
    pub prefer_external: bool,
}

/// One conversion handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Job id, used to scope workspace names and progress events.
    pub job_id: String,
    /// Original name of the source file (used for the suggested output name).
    pub source_name: String,
    /// Source payload.
    pub input: Arc<Vec<u8>>,
    /// Transcoder arguments between `-i <input>` and the output path,
    /// e.g. `["-c:v", "hap", "-format", "hap_q"]`.
    pub args: Vec<String>,
    /// Extension of the produced file, without the dot.
    pub output_extension: String,
    /// Engine demands for this job.
    pub requirements: JobRequirements,
}

impl ConversionRequest {
    /// Suggested filename for the produced output: source stem plus the
    /// target extension.
    pub fn suggested_filename(&self) -> String {
        let stem = match self.source_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => self.source_name.as_str(),
        };
        format!("{}.{}", stem, self.output_extension)
    }
}

/// The produced output of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// Output payload.
    pub data: Arc<Vec<u8>>,
    /// Suggested download filename.
    pub filename: String,
    /// Which engine produced it.
    pub engine: EngineKind,
}

/// A progress event emitted while a conversion runs.
///
/// `percent` is only present when the diagnostic stream yielded a usable
/// duration/position pair; consumers must leave their last value in place
/// otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Job this event belongs to.
    pub job_id: String,
    /// Derived completion percentage, 0-100.
    pub percent: Option<u8>,
    /// Tail of the raw diagnostic text that produced this event.
    pub raw_tail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, ext: &str) -> ConversionRequest {
        ConversionRequest {
            job_id: "job-1".to_string(),
            source_name: name.to_string(),
            input: Arc::new(vec![0u8; 4]),
            args: vec![],
            output_extension: ext.to_string(),
            requirements: JobRequirements::default(),
        }
    }

    #[test]
    fn test_suggested_filename_replaces_extension() {
        assert_eq!(request("clip.mov", "mp4").suggested_filename(), "clip.mp4");
        assert_eq!(
            request("a.b.c.avi", "webm").suggested_filename(),
            "a.b.c.webm"
        );
    }

    #[test]
    fn test_suggested_filename_without_extension() {
        assert_eq!(request("clip", "mp4").suggested_filename(), "clip.mp4");
        // A leading dot is not an extension separator.
        assert_eq!(request(".hidden", "mp4").suggested_filename(), ".hidden.mp4");
    }

    #[test]
    fn test_engine_kind_display() {
        assert_eq!(EngineKind::InProcess.to_string(), "in_process");
        assert_eq!(EngineKind::External.to_string(), "external");
    }
}
