//! One-shot capability probe for the external engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

use super::config::EngineConfig;

/// What the local environment offers, derived once per session.
///
/// The probe never fails hard: the in-process engine is always assumed
/// available as a fallback, so every probe error degrades to
/// `external_available = false`. The snapshot is cached for the session and
/// never invalidated; re-probing requires a restart.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineCapability {
    /// A system transcoder binary was found and responds.
    pub external_available: bool,
    /// That binary was built with the HAP encoder.
    pub external_supports_hap: bool,
}

impl EngineCapability {
    /// Probes the external engine by listing its encoders.
    ///
    /// Availability is exit code 0 within the probe timeout; HAP support is
    /// the presence of the `hap` encoder in the listing.
    pub async fn probe(config: &EngineConfig) -> Self {
        let binary = resolve_external_binary(config);

        // kill_on_drop: a timed-out probe must not leave a hung binary
        // running behind the session.
        let probe = Command::new(&binary)
            .arg("-encoders")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(Duration::from_secs(config.probe_timeout_secs), probe).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(output)) => {
                debug!(?binary, code = ?output.status.code(), "capability probe exited non-zero");
                return Self::default();
            }
            Ok(Err(e)) => {
                debug!(?binary, error = %e, "capability probe failed to spawn");
                return Self::default();
            }
            Err(_) => {
                debug!(?binary, "capability probe timed out");
                return Self::default();
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let supports_hap = encoder_listed(&combined, "hap");

        info!(
            binary = %binary.display(),
            supports_hap,
            "external engine available"
        );

        Self {
            external_available: true,
            external_supports_hap: supports_hap,
        }
    }
}

/// Resolves the external engine binary: explicit config override first, then
/// a fixed list of well-known install locations, then the bare name left to
/// PATH lookup at spawn time.
pub fn resolve_external_binary(config: &EngineConfig) -> PathBuf {
    if let Some(path) = &config.external_binary {
        return path.clone();
    }

    for candidate in well_known_locations() {
        if candidate.is_file() {
            return candidate;
        }
    }

    // Fall back to PATH resolution; spawn failure then reads as unavailable.
    PathBuf::from(binary_name())
}

fn binary_name() -> &'static str {
    if cfg!(windows) {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

fn well_known_locations() -> Vec<PathBuf> {
    if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/opt/local/bin/ffmpeg"),
        ]
    } else if cfg!(windows) {
        vec![
            PathBuf::from(r"C:\ffmpeg\bin\ffmpeg.exe"),
            PathBuf::from(r"C:\Program Files\ffmpeg\bin\ffmpeg.exe"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/snap/bin/ffmpeg"),
        ]
    }
}

/// Whether the encoder listing names `encoder`. Listing lines look like
/// ` V....D hap    Vidvox Hap`, so match on a whole whitespace-separated
/// token rather than a raw substring.
fn encoder_listed(listing: &str, encoder: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().any(|token| token == encoder))
}
