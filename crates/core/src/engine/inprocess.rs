//! The in-process engine seam.
//!
//! The in-process engine is addressed through a private named workspace:
//! callers stage input bytes under a name, exec with a command-line style
//! argument vector, read back a named output, and delete both entries. The
//! trait keeps the queue driver agnostic of what actually executes behind
//! the workspace; [`BundledEngine`] is the shipped implementation, backed by
//! a transcoder binary bundled alongside the application.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use super::config::EngineConfig;
use super::error::EngineError;
use super::progress::trim_to_tail;

/// Upper bound on the diagnostic text kept for an exec failure.
const DIAGNOSTIC_TAIL_CHARS: usize = 4000;

/// A transcoder executed inside the application's own lifetime, addressed
/// via a private workspace of named entries.
#[async_trait]
pub trait InProcessEngine: Send + Sync {
    /// Implementation name, for logs.
    fn name(&self) -> &str;

    /// Stages `data` under `name` in the private workspace.
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError>;

    /// Runs the engine with command-line style arguments. Names staged via
    /// [`write_file`](Self::write_file) are addressable as bare file names.
    /// Diagnostic text is streamed into `diagnostics` chunk by chunk as the
    /// engine produces it; the channel closes when the run ends. Sends are
    /// best-effort, a gone receiver must not fail the run.
    async fn exec(
        &self,
        args: &[String],
        diagnostics: mpsc::Sender<String>,
    ) -> Result<(), EngineError>;

    /// Reads a named entry back out of the workspace.
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Removes a named entry. Missing entries are not an error.
    async fn delete_file(&self, name: &str) -> Result<(), EngineError>;
}

/// The bundled engine: a transcoder binary shipped with the application,
/// always assumed present, running against a session-private workspace
/// directory. Workspace names map to files inside that directory and `exec`
/// runs with the directory as its working directory, so bare names resolve.
pub struct BundledEngine {
    binary: PathBuf,
    workspace: PathBuf,
}

impl BundledEngine {
    /// Creates the engine with an explicit binary and workspace directory.
    pub fn new(binary: PathBuf, workspace: PathBuf) -> Self {
        Self { binary, workspace }
    }

    /// Creates the engine from config: `engine.bundled_binary` when set,
    /// otherwise a binary next to the current executable, otherwise the bare
    /// name on PATH. The workspace lives under the configured temp dir.
    pub fn from_config(config: &EngineConfig) -> Self {
        let binary = config
            .bundled_binary
            .clone()
            .or_else(sibling_binary)
            .unwrap_or_else(|| PathBuf::from(default_binary_name()));
        Self::new(binary, config.temp_dir.join("workspace"))
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        // Names are caller-scoped identifiers, never paths.
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(EngineError::InvalidEntryName {
                name: name.to_string(),
            });
        }
        Ok(self.workspace.join(name))
    }
}

fn default_binary_name() -> &'static str {
    if cfg!(windows) {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

fn sibling_binary() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(default_binary_name());
    candidate.is_file().then_some(candidate)
}

#[async_trait]
impl InProcessEngine for BundledEngine {
    fn name(&self) -> &str {
        "bundled"
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        let path = self.entry_path(name)?;
        tokio::fs::create_dir_all(&self.workspace).await?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn exec(
        &self,
        args: &[String],
        diagnostics: mpsc::Sender<String>,
    ) -> Result<(), EngineError> {
        debug!(engine = self.name(), ?args, "exec");
        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::SpawnFailed {
                path: self.binary.clone(),
                reason: e.to_string(),
            })?;

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::conversion_failed("stderr was not captured"))?;

        let mut diagnostic = String::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = stderr.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
            diagnostic.push_str(&chunk);
            trim_to_tail(&mut diagnostic, DIAGNOSTIC_TAIL_CHARS);
            let _ = diagnostics.send(chunk).await;
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(EngineError::conversion_failed(diagnostic));
        }
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.entry_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::EntryNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        let path = self.entry_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
