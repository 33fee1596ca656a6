//! External engine: a natively installed transcoder run as a subprocess.
//!
//! The source payload is serialized to a temporary file, the binary is
//! invoked as `<binary> -i <input> <args...> -y <output>`, stderr is read
//! incrementally as the progress stream, and both temporary files are
//! best-effort deleted regardless of outcome.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::config::EngineConfig;
use super::error::EngineError;
use super::progress::{tail, trim_to_tail, ProgressParser};
use super::types::{ConversionOutput, ConversionRequest, EngineKind, ProgressEvent};

/// Session-wide counter making temporary file names unique even when two
/// invocations land on the same millisecond.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The subprocess-backed engine.
pub struct ExternalEngine {
    binary: PathBuf,
    temp_dir: PathBuf,
    stderr_tail_chars: usize,
}

impl ExternalEngine {
    pub fn new(binary: PathBuf, config: &EngineConfig) -> Self {
        Self {
            binary,
            temp_dir: config.temp_dir.clone(),
            stderr_tail_chars: config.stderr_tail_chars,
        }
    }

    /// Runs one conversion. Temporary input and output files are deleted on
    /// both the success and failure path; deletion failures are ignored (the
    /// cache directory is not guaranteed empty at process exit).
    pub async fn run(
        &self,
        req: &ConversionRequest,
        progress: &broadcast::Sender<ProgressEvent>,
    ) -> Result<ConversionOutput, EngineError> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;

        let (input_path, output_path) = self.temp_paths(&req.output_extension);
        tokio::fs::write(&input_path, req.input.as_slice()).await?;

        let result = self
            .convert(req, &input_path, &output_path, progress)
            .await;

        if let Err(e) = tokio::fs::remove_file(&input_path).await {
            debug!(path = %input_path.display(), error = %e, "temp input cleanup failed");
        }
        if let Err(e) = tokio::fs::remove_file(&output_path).await {
            debug!(path = %output_path.display(), error = %e, "temp output cleanup failed");
        }

        result
    }

    async fn convert(
        &self,
        req: &ConversionRequest,
        input_path: &PathBuf,
        output_path: &PathBuf,
        progress: &broadcast::Sender<ProgressEvent>,
    ) -> Result<ConversionOutput, EngineError> {
        let mut args: Vec<String> = vec![
            "-i".to_string(),
            input_path.to_string_lossy().into_owned(),
        ];
        args.extend(req.args.iter().cloned());
        args.push("-y".to_string());
        args.push(output_path.to_string_lossy().into_owned());

        debug!(binary = %self.binary.display(), ?args, job_id = %req.job_id, "spawning external engine");

        let mut child = Command::new(&self.binary)
            .args(&args)
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

        // Incremental stderr scrape: each chunk feeds the timestamp-pair
        // heuristic and is forwarded raw to subscribers. Chunks that match
        // nothing simply leave the percentage unchanged.
        let mut parser = ProgressParser::new();
        let mut diagnostic = String::new();
        let mut buf = [0u8; 8192];

        loop {
            let n = stderr.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
            diagnostic.push_str(&chunk);
            trim_to_tail(&mut diagnostic, self.stderr_tail_chars * 4);

            let percent = parser.observe(&chunk);
            let _ = progress.send(ProgressEvent {
                job_id: req.job_id.clone(),
                percent,
                raw_tail: tail(&chunk, self.stderr_tail_chars),
            });
        }

        let status = child.wait().await?;
        if !status.success() {
            let detail = tail(&diagnostic, self.stderr_tail_chars);
            warn!(job_id = %req.job_id, code = ?status.code(), "external engine failed");
            return Err(EngineError::ConversionFailed { detail });
        }

        let data = match tokio::fs::read(output_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::MissingOutput)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(ConversionOutput {
            data: Arc::new(data),
            filename: req.suggested_filename(),
            engine: EngineKind::External,
        })
    }

    fn temp_paths(&self, extension: &str) -> (PathBuf, PathBuf) {
        let millis = chrono::Utc::now().timestamp_millis();
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        (
            self.temp_dir.join(format!("input-{millis}-{counter}")),
            self.temp_dir
                .join(format!("output-{millis}-{counter}.{extension}")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::JobRequirements;
    use std::path::Path;

    fn request(data: &[u8]) -> ConversionRequest {
        ConversionRequest {
            job_id: "job-ext".to_string(),
            source_name: "clip.avi".to_string(),
            input: Arc::new(data.to_vec()),
            args: vec!["-c:v".to_string(), "copy".to_string()],
            output_extension: "mp4".to_string(),
            requirements: JobRequirements::default(),
        }
    }

    fn engine(binary: PathBuf, temp_dir: &Path) -> ExternalEngine {
        let config = EngineConfig::default().with_temp_dir(temp_dir.to_path_buf());
        ExternalEngine::new(binary, &config)
    }

    fn remaining_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| entries.flatten().map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_temp_paths_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(PathBuf::from("ffmpeg"), dir.path());
        let (in_a, out_a) = engine.temp_paths("mp4");
        let (in_b, out_b) = engine.temp_paths("mp4");
        assert_ne!(in_a, in_b);
        assert_ne!(out_a, out_b);
        assert!(out_a.to_string_lossy().ends_with(".mp4"));
        assert!(in_a
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("input-"));
    }

    #[tokio::test]
    async fn test_spawn_failure_cleans_temp_input() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(
            PathBuf::from("/nonexistent/mediamill-test/ffmpeg"),
            dir.path(),
        );
        let (tx, _rx) = broadcast::channel(16);

        let err = engine.run(&request(b"payload"), &tx).await.unwrap_err();
        assert!(matches!(err, EngineError::SpawnFailed { .. }));
        assert!(remaining_files(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_reports_progress_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("cache");
        let script = write_script(
            dir.path(),
            "fake-engine",
            r#"in="$2"
for a in "$@"; do out="$a"; done
echo "Duration: 00:00:10.00, start: 0.0" >&2
echo "frame=1 time=00:00:05.00 speed=2x" >&2
echo "frame=2 time=00:00:10.00 speed=2x" >&2
cp "$in" "$out""#,
        );

        let engine = engine(script, &temp);
        let (tx, mut rx) = broadcast::channel(64);

        let output = engine.run(&request(b"payload"), &tx).await.unwrap();
        assert_eq!(output.data.as_slice(), b"payload");
        assert_eq!(output.filename, "clip.mp4");
        assert_eq!(output.engine, EngineKind::External);

        // Both temp files deleted on the success path.
        assert!(remaining_files(&temp).is_empty());

        // Parsed percentages are non-decreasing and end at 100.
        let mut percents = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.job_id, "job-ext");
            if let Some(p) = event.percent {
                percents.push(p);
            }
        }
        assert!(!percents.is_empty());
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*percents.last().unwrap(), 100);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_run_surfaces_stderr_tail_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("cache");
        let script = write_script(
            dir.path(),
            "fake-engine",
            r#"echo "something went wrong: codec error" >&2
exit 3"#,
        );

        let engine = engine(script, &temp);
        let (tx, _rx) = broadcast::channel(16);

        let err = engine.run(&request(b"payload"), &tx).await.unwrap_err();
        match err {
            EngineError::ConversionFailed { detail } => assert!(detail.contains("codec error")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(remaining_files(&temp).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_without_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("cache");
        let script = write_script(dir.path(), "fake-engine", "exit 0");

        let engine = engine(script, &temp);
        let (tx, _rx) = broadcast::channel(16);

        let err = engine.run(&request(b"payload"), &tx).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingOutput));
        assert!(remaining_files(&temp).is_empty());
    }
}
