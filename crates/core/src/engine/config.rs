//! Configuration for the engine module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for engine dispatch and the external subprocess engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit path to the external engine binary. When unset, a fixed list
    /// of well-known install locations is tried, then the bare name on PATH.
    #[serde(default)]
    pub external_binary: Option<PathBuf>,

    /// Path to the bundled engine binary used by the in-process fallback.
    /// When unset, `ffmpeg` next to the current executable is tried, then
    /// the bare name on PATH.
    #[serde(default)]
    pub bundled_binary: Option<PathBuf>,

    /// Directory for per-job temporary input/output files (external path).
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Timeout for the one-shot capability probe in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// How many trailing characters of stderr are kept for error details.
    #[serde(default = "default_stderr_tail")]
    pub stderr_tail_chars: usize,
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("mediamill")
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_stderr_tail() -> usize {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            external_binary: None,
            bundled_binary: None,
            temp_dir: default_temp_dir(),
            probe_timeout_secs: default_probe_timeout(),
            stderr_tail_chars: default_stderr_tail(),
        }
    }
}

impl EngineConfig {
    /// Sets the temp directory.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Sets an explicit external binary path.
    pub fn with_external_binary(mut self, path: PathBuf) -> Self {
        self.external_binary = Some(path);
        self
    }
}
