//! Mock in-process engine for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::engine::{EngineError, InProcessEngine};

/// One workspace operation the mock has seen, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOp {
    Write(String),
    Exec(Vec<String>),
    Read(String),
    Delete(String),
}

/// Mock implementation of [`InProcessEngine`].
///
/// Provides controllable behavior for testing:
/// - records every workspace operation for assertions
/// - scripted per-exec failures (queued, consumed in order)
/// - scripted diagnostic chunks streamed by every exec
/// - configurable exec latency to widen race windows
/// - configurable output payload
#[derive(Debug)]
pub struct MockInProcessEngine {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    ops: Arc<RwLock<Vec<RecordedOp>>>,
    exec_failures: Arc<RwLock<VecDeque<String>>>,
    exec_stderr: Arc<RwLock<Vec<String>>>,
    exec_delay: Arc<RwLock<Duration>>,
    output_payload: Arc<RwLock<Vec<u8>>>,
}

impl Default for MockInProcessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInProcessEngine {
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(HashMap::new())),
            ops: Arc::new(RwLock::new(Vec::new())),
            exec_failures: Arc::new(RwLock::new(VecDeque::new())),
            exec_stderr: Arc::new(RwLock::new(Vec::new())),
            exec_delay: Arc::new(RwLock::new(Duration::from_millis(0))),
            output_payload: Arc::new(RwLock::new(b"converted".to_vec())),
        }
    }

    /// Queues a failure: the next exec (after any already queued ones are
    /// consumed) fails with this diagnostic.
    pub async fn fail_next_exec(&self, detail: impl Into<String>) {
        self.exec_failures.write().await.push_back(detail.into());
    }

    /// Sets the diagnostic chunks every exec streams before finishing.
    pub async fn set_exec_stderr(&self, chunks: Vec<String>) {
        *self.exec_stderr.write().await = chunks;
    }

    /// Sets the simulated exec latency.
    pub async fn set_exec_delay(&self, delay: Duration) {
        *self.exec_delay.write().await = delay;
    }

    /// Sets the bytes every successful exec writes to the output entry.
    pub async fn set_output_payload(&self, payload: Vec<u8>) {
        *self.output_payload.write().await = payload;
    }

    /// All operations seen so far, in order.
    pub async fn recorded_ops(&self) -> Vec<RecordedOp> {
        self.ops.read().await.clone()
    }

    /// How many times `name` was deleted.
    pub async fn delete_count(&self, name: &str) -> usize {
        self.ops
            .read()
            .await
            .iter()
            .filter(|op| matches!(op, RecordedOp::Delete(n) if n == name))
            .count()
    }

    /// How many execs ran.
    pub async fn exec_count(&self) -> usize {
        self.ops
            .read()
            .await
            .iter()
            .filter(|op| matches!(op, RecordedOp::Exec(_)))
            .count()
    }

    /// Entries currently present in the workspace.
    pub async fn workspace_entries(&self) -> Vec<String> {
        self.files.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl InProcessEngine for MockInProcessEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        self.ops
            .write()
            .await
            .push(RecordedOp::Write(name.to_string()));
        self.files
            .write()
            .await
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn exec(
        &self,
        args: &[String],
        diagnostics: mpsc::Sender<String>,
    ) -> Result<(), EngineError> {
        self.ops.write().await.push(RecordedOp::Exec(args.to_vec()));

        let delay = *self.exec_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        for chunk in self.exec_stderr.read().await.iter() {
            let _ = diagnostics.send(chunk.clone()).await;
        }

        if let Some(detail) = self.exec_failures.write().await.pop_front() {
            return Err(EngineError::ConversionFailed { detail });
        }

        // The output entry is the last argument, as the dispatcher builds it.
        if let Some(output) = args.last() {
            let payload = self.output_payload.read().await.clone();
            self.files.write().await.insert(output.clone(), payload);
        }
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.ops
            .write()
            .await
            .push(RecordedOp::Read(name.to_string()));
        self.files
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::EntryNotFound {
                name: name.to_string(),
            })
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        self.ops
            .write()
            .await
            .push(RecordedOp::Delete(name.to_string()));
        self.files.write().await.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> mpsc::Sender<String> {
        let (tx, _rx) = mpsc::channel(16);
        tx
    }

    #[tokio::test]
    async fn test_records_operations_in_order() {
        let engine = MockInProcessEngine::new();
        engine.write_file("in", b"x").await.unwrap();
        engine
            .exec(&["-i".into(), "in".into(), "out".into()], sink())
            .await
            .unwrap();
        let data = engine.read_file("out").await.unwrap();
        assert_eq!(data, b"converted");

        let ops = engine.recorded_ops().await;
        assert!(matches!(ops[0], RecordedOp::Write(ref n) if n == "in"));
        assert!(matches!(ops[1], RecordedOp::Exec(_)));
        assert!(matches!(ops[2], RecordedOp::Read(ref n) if n == "out"));
    }

    #[tokio::test]
    async fn test_scripted_failures_consumed_in_order() {
        let engine = MockInProcessEngine::new();
        engine.fail_next_exec("first failure").await;

        let err = engine.exec(&["out".into()], sink()).await.unwrap_err();
        assert!(matches!(err, EngineError::ConversionFailed { ref detail } if detail == "first failure"));

        // Next exec succeeds again.
        engine.exec(&["out".into()], sink()).await.unwrap();
        assert_eq!(engine.exec_count().await, 2);
    }

    #[tokio::test]
    async fn test_scripted_stderr_is_streamed() {
        let engine = MockInProcessEngine::new();
        engine
            .set_exec_stderr(vec!["Duration: 00:00:10.00".into(), "time=00:00:05.00".into()])
            .await;

        let (tx, mut rx) = mpsc::channel(16);
        engine.exec(&["out".into()], tx).await.unwrap();

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        assert_eq!(chunks, vec!["Duration: 00:00:10.00", "time=00:00:05.00"]);
    }
}
