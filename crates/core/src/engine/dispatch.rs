//! Engine dispatch: one call signature over both engines.
//!
//! The dispatcher owns the session capability snapshot and both engine
//! handles, so the queue driver never needs to know which engine ran a job.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::metrics;

use super::capability::{resolve_external_binary, EngineCapability};
use super::config::EngineConfig;
use super::error::EngineError;
use super::external::ExternalEngine;
use super::inprocess::InProcessEngine;
use super::progress::{tail, ProgressParser};
use super::types::{
    ConversionOutput, ConversionRequest, EngineKind, JobRequirements, ProgressEvent,
};

/// Capacity of the progress broadcast channel. Progress is advisory; slow
/// subscribers may lag and lose ticks.
const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the in-process diagnostics channel; the forwarder drains it
/// concurrently, so a small buffer suffices.
const DIAGNOSTICS_CHANNEL_CAPACITY: usize = 16;

/// Routes conversions to the in-process or external engine.
pub struct EngineDispatcher {
    capability: EngineCapability,
    in_process: Arc<dyn InProcessEngine>,
    external: ExternalEngine,
    progress_tx: broadcast::Sender<ProgressEvent>,
    stderr_tail_chars: usize,
}

impl EngineDispatcher {
    /// Builds a dispatcher over an already-probed capability snapshot.
    pub fn new(
        config: &EngineConfig,
        in_process: Arc<dyn InProcessEngine>,
        capability: EngineCapability,
    ) -> Self {
        let binary = resolve_external_binary(config);
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            capability,
            in_process,
            external: ExternalEngine::new(binary, config),
            progress_tx,
            stderr_tail_chars: config.stderr_tail_chars,
        }
    }

    /// Probes capability once, then builds the dispatcher. The snapshot is
    /// cached for the session; re-probing requires a restart.
    pub async fn probe(config: &EngineConfig, in_process: Arc<dyn InProcessEngine>) -> Self {
        let capability = EngineCapability::probe(config).await;
        Self::new(config, in_process, capability)
    }

    /// The session capability snapshot.
    pub fn capability(&self) -> EngineCapability {
        self.capability
    }

    /// Subscribes to progress events for all conversions this dispatcher runs.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    /// Pure decision function over the cached capability snapshot.
    ///
    /// A job that demands HAP goes external only when the external engine
    /// both exists and was built with the HAP encoder; otherwise it falls to
    /// the in-process engine (and fails there, surfacing as a job error).
    pub fn select_engine(&self, requirements: &JobRequirements) -> EngineKind {
        if requirements.needs_hap && self.capability.external_supports_hap {
            return EngineKind::External;
        }
        if self.capability.external_available && requirements.prefer_external {
            return EngineKind::External;
        }
        EngineKind::InProcess
    }

    /// Runs one conversion on the engine selected for it.
    ///
    /// Failures are contained: the caller receives an error describing this
    /// job's outcome and nothing else. Nothing is retried here.
    pub async fn run_conversion(
        &self,
        req: &ConversionRequest,
    ) -> Result<ConversionOutput, EngineError> {
        let kind = self.select_engine(&req.requirements);
        debug!(job_id = %req.job_id, engine = %kind, "running conversion");

        let started = Instant::now();
        let result = match kind {
            EngineKind::External => self.external.run(req, &self.progress_tx).await,
            EngineKind::InProcess => self.run_in_process(req).await,
        };

        let engine_label = kind.to_string();
        let result_label = if result.is_ok() { "success" } else { "error" };
        metrics::CONVERSIONS_TOTAL
            .with_label_values(&[&engine_label, result_label])
            .inc();
        metrics::CONVERSION_DURATION
            .with_label_values(&[&engine_label])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    /// In-process path: stage input under a job-scoped name, exec, read the
    /// job-scoped output back, and delete both names on success and failure.
    async fn run_in_process(&self, req: &ConversionRequest) -> Result<ConversionOutput, EngineError> {
        let input_name = format!("input-{}", req.job_id);
        let output_name = format!("output-{}.{}", req.job_id, req.output_extension);

        let outcome = self.exec_in_workspace(req, &input_name, &output_name).await;

        // Guaranteed cleanup of both named entries, success or failure.
        if let Err(e) = self.in_process.delete_file(&input_name).await {
            debug!(name = %input_name, error = %e, "workspace input cleanup failed");
        }
        if let Err(e) = self.in_process.delete_file(&output_name).await {
            debug!(name = %output_name, error = %e, "workspace output cleanup failed");
        }

        outcome
    }

    async fn exec_in_workspace(
        &self,
        req: &ConversionRequest,
        input_name: &str,
        output_name: &str,
    ) -> Result<ConversionOutput, EngineError> {
        self.in_process.write_file(input_name, &req.input).await?;

        let mut args: Vec<String> = vec!["-i".to_string(), input_name.to_string()];
        args.extend(req.args.iter().cloned());
        args.push(output_name.to_string());

        // Diagnostics stream out of exec while it runs; a forwarder scrapes
        // each chunk into progress events, same as the external path.
        let (tx, mut rx) = mpsc::channel::<String>(DIAGNOSTICS_CHANNEL_CAPACITY);
        let progress_tx = self.progress_tx.clone();
        let job_id = req.job_id.clone();
        let tail_chars = self.stderr_tail_chars;
        let forwarder = tokio::spawn(async move {
            let mut parser = ProgressParser::new();
            while let Some(chunk) = rx.recv().await {
                let percent = parser.observe(&chunk);
                let _ = progress_tx.send(ProgressEvent {
                    job_id: job_id.clone(),
                    percent,
                    raw_tail: tail(&chunk, tail_chars),
                });
            }
        });

        let exec_result = self.in_process.exec(&args, tx).await;
        let _ = forwarder.await;
        exec_result?;

        let data = self.in_process.read_file(output_name).await?;

        Ok(ConversionOutput {
            data: Arc::new(data),
            filename: req.suggested_filename(),
            engine: EngineKind::InProcess,
        })
    }
}
