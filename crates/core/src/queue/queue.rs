//! The batch job queue and its drive loop.
//!
//! The queue owns the ordered job list and enforces the single-concurrency
//! invariant with a boolean latch: however many times `start_processing` is
//! called, at most one drive loop exists, and it converts exactly one job at
//! a time, always the earliest pending job in list order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{ConversionOutput, ConversionRequest, EngineDispatcher, EngineError};
use crate::metrics;

use super::types::{
    ConversionJob, ConversionRecipe, JobState, JobView, QueueError, QueueEvent, QueueSummary,
    ResultHandle, SourceFile,
};

/// Capacity of the queue event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Ordered batch of conversion jobs, processed strictly one at a time.
pub struct JobQueue {
    dispatcher: Arc<EngineDispatcher>,
    jobs: Arc<RwLock<Vec<ConversionJob>>>,
    /// Pause flag, observed only at job boundaries.
    paused: AtomicBool,
    /// In-flight latch: true while a drive loop exists.
    driving: AtomicBool,
    events: broadcast::Sender<QueueEvent>,
}

impl JobQueue {
    pub fn new(dispatcher: Arc<EngineDispatcher>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            dispatcher,
            jobs: Arc::new(RwLock::new(Vec::new())),
            paused: AtomicBool::new(false),
            driving: AtomicBool::new(false),
            events,
        }
    }

    /// Subscribes to queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Appends a job in `pending` state. Processing does not start
    /// automatically; call [`start_processing`](Self::start_processing).
    pub async fn enqueue(&self, source: SourceFile, recipe: ConversionRecipe) -> JobView {
        let job = ConversionJob::new(source, recipe);
        let view = job.view();
        debug!(id = %job.id, name = %job.source.name, "job enqueued");
        self.jobs.write().await.push(job);
        metrics::JOBS_ENQUEUED.inc();
        let _ = self.events.send(QueueEvent::JobUpdated { job: view.clone() });
        view
    }

    /// Starts the drive loop. Idempotent: if a loop is already active this
    /// only clears the pause flag, so it doubles as "resume".
    pub fn start_processing(self: &Arc<Self>) {
        self.paused.store(false, Ordering::SeqCst);
        if self.driving.swap(true, Ordering::SeqCst) {
            debug!("drive loop already active");
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.drive_loop().await;
        });
    }

    /// Requests a pause. The in-flight conversion (if any) runs to
    /// completion; its job is then reset to `pending` and the loop halts.
    /// No future job is picked until [`start_processing`](Self::start_processing).
    pub fn pause_processing(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Whether a pause has been requested.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Whether a drive loop is currently active.
    pub fn is_driving(&self) -> bool {
        self.driving.load(Ordering::SeqCst)
    }

    /// All jobs, in list order.
    pub async fn jobs(&self) -> Vec<JobView> {
        self.jobs.read().await.iter().map(|j| j.view()).collect()
    }

    /// A single job.
    pub async fn job(&self, id: Uuid) -> Option<JobView> {
        self.jobs
            .read()
            .await
            .iter()
            .find(|j| j.id == id)
            .map(|j| j.view())
    }

    /// Counts per state.
    pub async fn summary(&self) -> QueueSummary {
        let jobs = self.jobs.read().await;
        let mut summary = QueueSummary::default();
        for job in jobs.iter() {
            match job.state {
                JobState::Pending => summary.pending += 1,
                JobState::Processing => summary.processing += 1,
                JobState::Completed => summary.completed += 1,
                JobState::Error => summary.error += 1,
            }
        }
        summary
    }

    /// The produced output of a completed job. The bytes stay owned by the
    /// job until it is removed or the queue cleared.
    pub async fn result(&self, id: Uuid) -> Result<ResultHandle, QueueError> {
        let jobs = self.jobs.read().await;
        let job = jobs
            .iter()
            .find(|j| j.id == id)
            .ok_or(QueueError::JobNotFound(id))?;
        job.result.clone().ok_or(QueueError::InvalidState {
            id,
            expected: "completed",
            actual: job.state,
        })
    }

    /// Removes a job. Rejected while the job is `processing`; a job must
    /// leave that state before it can be removed.
    pub async fn remove_job(&self, id: Uuid) -> Result<(), QueueError> {
        let mut jobs = self.jobs.write().await;
        let idx = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or(QueueError::JobNotFound(id))?;
        if jobs[idx].state == JobState::Processing {
            return Err(QueueError::JobProcessing(id));
        }
        jobs.remove(idx);
        drop(jobs);
        let _ = self.events.send(QueueEvent::JobRemoved { id });
        Ok(())
    }

    /// Resets an errored job to `pending`, clearing its diagnostic. The job
    /// keeps its queue position and becomes eligible for the next pick.
    pub async fn retry_job(&self, id: Uuid) -> Result<JobView, QueueError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(QueueError::JobNotFound(id))?;
        match job.state {
            JobState::Processing => return Err(QueueError::JobProcessing(id)),
            JobState::Error => {}
            other => {
                return Err(QueueError::InvalidState {
                    id,
                    expected: "error",
                    actual: other,
                })
            }
        }
        job.state = JobState::Pending;
        job.error_detail = None;
        job.progress_percent = 0;
        let view = job.view();
        drop(jobs);
        metrics::JOBS_RETRIED.inc();
        let _ = self.events.send(QueueEvent::JobUpdated { job: view.clone() });
        Ok(view)
    }

    /// Moves a job to `index` (clamped), changing future pick order.
    pub async fn move_job(&self, id: Uuid, index: usize) -> Result<(), QueueError> {
        let mut jobs = self.jobs.write().await;
        let from = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or(QueueError::JobNotFound(id))?;
        let job = jobs.remove(from);
        let to = index.min(jobs.len());
        jobs.insert(to, job);
        let view = jobs[to].view();
        drop(jobs);
        let _ = self.events.send(QueueEvent::JobUpdated { job: view });
        Ok(())
    }

    /// Removes all completed jobs, releasing their output buffers.
    pub async fn clear_completed(&self) -> usize {
        self.clear_where(|j| j.state == JobState::Completed).await
    }

    /// Removes every job except one currently `processing`.
    pub async fn clear_all(&self) -> usize {
        self.clear_where(|j| j.state != JobState::Processing).await
    }

    async fn clear_where(&self, doomed: impl Fn(&ConversionJob) -> bool) -> usize {
        let mut jobs = self.jobs.write().await;
        let mut removed = Vec::new();
        jobs.retain(|j| {
            if doomed(j) {
                removed.push(j.id);
                false
            } else {
                true
            }
        });
        drop(jobs);
        for id in &removed {
            let _ = self.events.send(QueueEvent::JobRemoved { id: *id });
        }
        removed.len()
    }

    async fn drive_loop(self: Arc<Self>) {
        info!("drive loop started");
        loop {
            loop {
                if self.paused.load(Ordering::SeqCst) {
                    let _ = self.events.send(QueueEvent::Paused);
                    break;
                }

                let Some((id, request)) = self.pick_next().await else {
                    debug!("no pending jobs, drive loop idle");
                    let _ = self.events.send(QueueEvent::Idle);
                    break;
                };

                let outcome = self.run_with_progress(id, &request).await;

                if self.paused.load(Ordering::SeqCst) {
                    // Pause observed after the in-flight call finished: the job
                    // goes back to pending and the outcome is discarded. This
                    // mirrors the historical behavior; see DESIGN.md.
                    warn!(id = %id, "pause observed, returning in-flight job to pending");
                    self.reset_to_pending(id).await;
                    let _ = self.events.send(QueueEvent::Paused);
                    break;
                }

                self.apply_outcome(id, outcome).await;
            }
            self.driving.store(false, Ordering::SeqCst);

            // A start_processing call racing the store above read the latch
            // as held and did not spawn. Re-check: if work is runnable and
            // the latch is still free, this loop takes another round.
            if self.paused.load(Ordering::SeqCst) || !self.has_pending().await {
                break;
            }
            if self.driving.swap(true, Ordering::SeqCst) {
                break;
            }
        }
    }

    async fn has_pending(&self) -> bool {
        self.jobs
            .read()
            .await
            .iter()
            .any(|j| j.state == JobState::Pending)
    }

    /// Marks the earliest pending job as processing and builds its request.
    async fn pick_next(&self) -> Option<(Uuid, ConversionRequest)> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.iter_mut().find(|j| j.state == JobState::Pending)?;
        job.state = JobState::Processing;
        job.progress_percent = 0;
        let view = job.view();
        let request = ConversionRequest {
            job_id: job.id.to_string(),
            source_name: job.source.name.clone(),
            input: Arc::clone(&job.source.data),
            args: job.recipe.args.clone(),
            output_extension: job.recipe.output_extension.clone(),
            requirements: job.recipe.requirements,
        };
        let id = job.id;
        drop(jobs);
        debug!(id = %id, "job picked");
        let _ = self.events.send(QueueEvent::JobUpdated { job: view });
        Some((id, request))
    }

    /// Awaits the conversion while forwarding its progress events into the
    /// job record.
    async fn run_with_progress(
        &self,
        id: Uuid,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput, EngineError> {
        let mut progress_rx = self.dispatcher.subscribe_progress();
        let run = self.dispatcher.run_conversion(request);
        tokio::pin!(run);

        loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                event = progress_rx.recv() => {
                    if let Ok(event) = event {
                        if event.job_id == request.job_id {
                            if let Some(percent) = event.percent {
                                self.set_progress(id, percent).await;
                            }
                        }
                    }
                    // Lagged/closed progress streams are advisory only.
                }
            }
        }
    }

    async fn set_progress(&self, id: Uuid, percent: u8) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == id && j.state == JobState::Processing)
        else {
            return;
        };
        if job.progress_percent == percent {
            return;
        }
        job.progress_percent = percent.min(100);
        let view = job.view();
        drop(jobs);
        let _ = self.events.send(QueueEvent::JobUpdated { job: view });
    }

    async fn apply_outcome(&self, id: Uuid, outcome: Result<ConversionOutput, EngineError>) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            // Removal of a processing job is rejected, so this is unreachable
            // in practice; tolerate it rather than panic.
            warn!(id = %id, "finished job no longer in queue");
            return;
        };
        match outcome {
            Ok(output) => {
                info!(id = %id, filename = %output.filename, engine = %output.engine, "job completed");
                job.state = JobState::Completed;
                job.progress_percent = 100;
                job.result = Some(ResultHandle {
                    filename: output.filename,
                    data: output.data,
                });
                job.error_detail = None;
            }
            Err(e) => {
                warn!(id = %id, error = %e, "job failed");
                job.state = JobState::Error;
                job.result = None;
                job.error_detail = Some(e.detail());
            }
        }
        let view = job.view();
        drop(jobs);
        let _ = self.events.send(QueueEvent::JobUpdated { job: view });
    }

    async fn reset_to_pending(&self, id: Uuid) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            return;
        };
        job.state = JobState::Pending;
        job.progress_percent = 0;
        job.result = None;
        job.error_detail = None;
        let view = job.view();
        drop(jobs);
        let _ = self.events.send(QueueEvent::JobUpdated { job: view });
    }
}
