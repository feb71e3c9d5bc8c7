//! Worker loop: dequeue, claim, run, record.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use flashdeck_core::{defaults, Error, JobRepository, Result, WorkQueue};
use flashdeck_text::PipelineConfig;

use crate::handler::{DeckHandler, JobContext, JobHandler, JobResult};

/// Configuration for the job worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// How long one dequeue waits on an empty queue.
    pub dequeue_timeout_ms: u64,
    /// Pause after a store or queue error.
    pub error_backoff_ms: u64,
    /// Independent loops started by [`JobWorker::start`].
    pub concurrency: usize,
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout_ms: defaults::DEQUEUE_TIMEOUT_MS,
            error_backoff_ms: defaults::ERROR_BACKOFF_MS,
            concurrency: defaults::WORKER_CONCURRENCY,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `WORKER_CONCURRENCY` | `1` | Worker loops in this process |
    /// | `WORKER_DEQUEUE_TIMEOUT_MS` | `30000` | Blocking dequeue timeout |
    /// | `WORKER_ERROR_BACKOFF_MS` | `5000` | Sleep after a store/queue error |
    pub fn from_env() -> Self {
        let enabled = std::env::var("WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let concurrency = std::env::var("WORKER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::WORKER_CONCURRENCY)
            .max(1);

        let dequeue_timeout_ms = std::env::var("WORKER_DEQUEUE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::DEQUEUE_TIMEOUT_MS);

        let error_backoff_ms = std::env::var("WORKER_ERROR_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::ERROR_BACKOFF_MS);

        Self {
            dequeue_timeout_ms,
            error_backoff_ms,
            concurrency,
            enabled,
        }
    }

    pub fn with_dequeue_timeout(mut self, ms: u64) -> Self {
        self.dequeue_timeout_ms = ms;
        self
    }

    pub fn with_error_backoff(mut self, ms: u64) -> Self {
        self.error_backoff_ms = ms;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    WorkerStarted { worker: usize },
    /// This worker won the claim.
    JobClaimed { job_id: Uuid },
    /// Dequeued id discarded: claimed elsewhere, not queued, or unknown.
    JobSkipped { job_id: Uuid, reason: String },
    JobCompleted { job_id: Uuid, card_count: usize },
    JobFailed { job_id: Uuid, error: String },
    WorkerStopped { worker: usize },
}

/// What one dequeue-claim-run round ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The dequeue timed out on an empty queue.
    Idle,
    Skipped(Uuid),
    Completed(Uuid),
    Failed(Uuid),
    /// The store or queue errored; the caller should back off.
    Unavailable,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Stop every loop and wait for it to exit.
    ///
    /// A loop stops between jobs: a job already claimed is run to its
    /// terminal state first.
    pub async fn shutdown(self) -> Result<()> {
        // Err only means every loop already exited.
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks {
            task.await
                .map_err(|e| Error::Internal(format!("Worker loop panicked: {e}")))?;
        }
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Number of running loops.
    pub fn loops(&self) -> usize {
        self.tasks.len()
    }
}

/// Job worker that drains the work queue.
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    queue: Arc<dyn WorkQueue>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        queue: Arc<dyn WorkQueue>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            jobs,
            queue,
            handler,
            config,
            event_tx,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Spawn `concurrency` loops and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let event_rx = self.event_tx.subscribe();

        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return WorkerHandle {
                shutdown_tx,
                tasks: Vec::new(),
                event_rx,
            };
        }

        let worker = Arc::new(self);
        let tasks = (0..worker.config.concurrency.max(1))
            .map(|index| {
                let worker = worker.clone();
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move { worker.run(index, shutdown_rx).await })
            })
            .collect();

        WorkerHandle {
            shutdown_tx,
            tasks,
            event_rx,
        }
    }

    /// One round without the loop: dequeue (waiting up to the configured
    /// timeout), then claim and run whatever came out.
    pub async fn poll_once(&self) -> PollOutcome {
        match self.queue.dequeue_blocking(self.dequeue_timeout()).await {
            Ok(Some(job_id)) => self.process(job_id).await,
            Ok(None) => PollOutcome::Idle,
            Err(e) => {
                error!(error = %e, "Failed to dequeue job");
                PollOutcome::Unavailable
            }
        }
    }

    async fn run(&self, index: usize, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            worker = index,
            dequeue_timeout_ms = self.config.dequeue_timeout_ms,
            handler = self.handler.name(),
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted { worker: index });

        let backoff = Duration::from_millis(self.config.error_backoff_ms);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // Only the wait races shutdown. The pop is never cancelled, so an id
            // taken off the queue is always processed.
            let dequeued = match self.queue.try_dequeue().await {
                Ok(None) => tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    waited = self.queue.wait_for_work(self.dequeue_timeout()) => waited.map(|()| None),
                },
                other => other,
            };

            let outcome = match dequeued {
                Ok(Some(job_id)) => self.process(job_id).await,
                Ok(None) => PollOutcome::Idle,
                Err(e) => {
                    error!(worker = index, error = %e, "Failed to dequeue job");
                    PollOutcome::Unavailable
                }
            };

            if outcome == PollOutcome::Unavailable {
                debug!(worker = index, backoff_ms = self.config.error_backoff_ms, "Backing off");
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = sleep(backoff) => {}
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped { worker: index });
        info!(worker = index, "Job worker stopped");
    }

    /// Claim `job_id`, run the handler, and record the terminal state.
    #[instrument(skip(self))]
    pub async fn process(&self, job_id: Uuid) -> PollOutcome {
        let job = match self.jobs.claim(job_id).await {
            Ok(job) => job,
            Err(e) if e.is_conflict() => {
                debug!(%job_id, "Job already claimed, skipping");
                return self.skipped(job_id, e);
            }
            Err(e @ Error::NotFound(_)) => {
                warn!(%job_id, "Dequeued id has no job, skipping");
                return self.skipped(job_id, e);
            }
            Err(e) => {
                // The job is still queued; hand the id back so it is not stranded.
                error!(%job_id, error = %e, "Failed to claim job");
                if let Err(e) = self.queue.enqueue(job_id).await {
                    error!(%job_id, error = %e, "Failed to re-enqueue job");
                }
                return PollOutcome::Unavailable;
            }
        };

        let start = Instant::now();
        let source_name = job.source_name.clone();
        info!(%job_id, %source_name, "Processing job");
        let _ = self.event_tx.send(WorkerEvent::JobClaimed { job_id });

        let handler = self.handler.clone();
        let ctx = JobContext::new(job);
        let result = match tokio::spawn(async move { handler.execute(ctx).await }).await {
            Ok(result) => result,
            Err(e) => JobResult::Failed(format!("Job handler panicked: {e}")),
        };

        match result {
            JobResult::Success(result) => {
                let card_count = result.deck.len();
                match self.jobs.complete(job_id, result).await {
                    Ok(_) => {
                        info!(
                            %job_id,
                            %source_name,
                            card_count,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "Job completed successfully"
                        );
                        let _ = self
                            .event_tx
                            .send(WorkerEvent::JobCompleted { job_id, card_count });
                        PollOutcome::Completed(job_id)
                    }
                    Err(e) if e.is_conflict() => {
                        warn!(%job_id, error = %e, "Conflicting terminal write");
                        self.skipped(job_id, e)
                    }
                    Err(e) => {
                        error!(%job_id, error = %e, "Failed to store job result");
                        self.record_failure(job_id, format!("Failed to store result: {e}"), start)
                            .await
                    }
                }
            }
            JobResult::Failed(error) => self.record_failure(job_id, error, start).await,
        }
    }

    async fn record_failure(&self, job_id: Uuid, error: String, start: Instant) -> PollOutcome {
        match self.jobs.fail(job_id, &error).await {
            Ok(_) => {
                warn!(
                    %job_id,
                    %error,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job failed"
                );
                let _ = self.event_tx.send(WorkerEvent::JobFailed { job_id, error });
                PollOutcome::Failed(job_id)
            }
            Err(e) if e.is_conflict() => {
                warn!(%job_id, error = %e, "Conflicting terminal write");
                self.skipped(job_id, e)
            }
            Err(e) => {
                error!(%job_id, error = %e, "Failed to mark job as failed");
                PollOutcome::Unavailable
            }
        }
    }

    fn skipped(&self, job_id: Uuid, reason: Error) -> PollOutcome {
        let _ = self.event_tx.send(WorkerEvent::JobSkipped {
            job_id,
            reason: reason.to_string(),
        });
        PollOutcome::Skipped(job_id)
    }

    fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.config.dequeue_timeout_ms)
    }
}

/// Builder for creating a job worker.
pub struct WorkerBuilder {
    jobs: Arc<dyn JobRepository>,
    queue: Arc<dyn WorkQueue>,
    config: WorkerConfig,
    handler: Option<Arc<dyn JobHandler>>,
}

impl WorkerBuilder {
    pub fn new(jobs: Arc<dyn JobRepository>, queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            jobs,
            queue,
            config: WorkerConfig::default(),
            handler: None,
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default [`DeckHandler`].
    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Use a [`DeckHandler`] with this pipeline configuration.
    pub fn with_pipeline(self, config: PipelineConfig) -> Self {
        self.with_handler(DeckHandler::new(config))
    }

    pub fn build(self) -> JobWorker {
        let handler = self
            .handler
            .unwrap_or_else(|| Arc::new(DeckHandler::default()));
        JobWorker::new(self.jobs, self.queue, handler, self.config)
    }
}
