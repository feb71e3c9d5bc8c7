//! Worker loop and submission behaviour over the in-memory store and queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use flashdeck_db::{MemoryJobRepository, MemoryWorkQueue};
use flashdeck_jobs::{
    CreateJobRequest, DeckHandler, Error, Job, JobContext, JobHandler, JobRepository, JobResult,
    JobStatus, JobWorker, PipelineResult, PollOutcome, QueueStats, Result, SubmissionService,
    WorkQueue, WorkerBuilder, WorkerConfig, WorkerEvent,
};

const TEXT: &str =
    "Machine learning is a subset of Artificial Intelligence. Neural networks model neurons.";

struct Harness {
    jobs: Arc<MemoryJobRepository>,
    queue: Arc<MemoryWorkQueue>,
    service: SubmissionService,
}

fn harness() -> Harness {
    let jobs = Arc::new(MemoryJobRepository::new());
    let queue = Arc::new(MemoryWorkQueue::new());
    let service = SubmissionService::new(jobs.clone(), queue.clone());
    Harness {
        jobs,
        queue,
        service,
    }
}

fn fast_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_dequeue_timeout(20)
        .with_error_backoff(10)
}

fn worker_for(h: &Harness) -> JobWorker {
    WorkerBuilder::new(h.jobs.clone(), h.queue.clone())
        .with_config(fast_config())
        .build()
}

/// Panics on payloads containing "PANIC", fails on "FAIL", otherwise runs the pipeline.
struct FlakyHandler;

#[async_trait]
impl JobHandler for FlakyHandler {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        if ctx.payload().contains("PANIC") {
            panic!("handler blew up");
        }
        if ctx.payload().contains("FAIL") {
            return JobResult::Failed("refused".to_string());
        }
        DeckHandler::default().execute(ctx).await
    }
}

/// Records the stored status of the job while the handler runs.
struct ObservingHandler {
    jobs: Arc<MemoryJobRepository>,
    seen: Arc<std::sync::Mutex<Vec<JobStatus>>>,
}

#[async_trait]
impl JobHandler for ObservingHandler {
    fn name(&self) -> &'static str {
        "observing"
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let status = self.jobs.get(ctx.job_id()).await.unwrap().status();
        self.seen.lock().unwrap().push(status);
        DeckHandler::default().execute(ctx).await
    }
}

/// Fails the first `failures` claims with a store error.
struct UnreliableRepository {
    inner: MemoryJobRepository,
    failures: AtomicUsize,
}

#[async_trait]
impl JobRepository for UnreliableRepository {
    async fn create(&self, req: CreateJobRequest) -> Result<Job> {
        self.inner.create(req).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Job> {
        self.inner.get(job_id).await
    }

    async fn claim(&self, job_id: Uuid) -> Result<Job> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Internal("connection reset".to_string()));
        }
        self.inner.claim(job_id).await
    }

    async fn complete(&self, job_id: Uuid, result: PipelineResult) -> Result<Job> {
        self.inner.complete(job_id, result).await
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<Job> {
        self.inner.fail(job_id, error).await
    }

    async fn list_by_owner(
        &self,
        owner: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>> {
        self.inner.list_by_owner(owner, limit, offset).await
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        self.inner.queue_stats().await
    }
}

/// Takes an id off the queue, then stalls before handing it over.
struct SlowQueue {
    inner: MemoryWorkQueue,
    stall: Duration,
}

#[async_trait]
impl WorkQueue for SlowQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<()> {
        self.inner.enqueue(job_id).await
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<Uuid>> {
        let job_id = self.inner.dequeue_blocking(timeout).await?;
        tokio::time::sleep(self.stall).await;
        Ok(job_id)
    }

    async fn try_dequeue(&self) -> Result<Option<Uuid>> {
        let job_id = self.inner.try_dequeue().await?;
        if job_id.is_some() {
            tokio::time::sleep(self.stall).await;
        }
        Ok(job_id)
    }

    async fn wait_for_work(&self, timeout: Duration) -> Result<()> {
        self.inner.wait_for_work(timeout).await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }
}

/// Rejects every enqueue.
struct UnavailableQueue;

#[async_trait]
impl WorkQueue for UnavailableQueue {
    async fn enqueue(&self, _job_id: Uuid) -> Result<()> {
        Err(Error::Internal("queue unavailable".to_string()))
    }

    async fn dequeue_blocking(&self, _timeout: Duration) -> Result<Option<Uuid>> {
        Ok(None)
    }

    async fn try_dequeue(&self) -> Result<Option<Uuid>> {
        Ok(None)
    }

    async fn wait_for_work(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
}

async fn wait_for_completed(
    events: &mut tokio::sync::broadcast::Receiver<WorkerEvent>,
    expected: usize,
) -> Vec<Uuid> {
    let mut done = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while done.len() < expected {
            if let Ok(WorkerEvent::JobCompleted { job_id, .. }) = events.recv().await {
                done.push(job_id);
            }
        }
    })
    .await
    .expect("timed out waiting for jobs");
    done
}

#[tokio::test]
async fn test_new_job_is_queued_without_result_or_error() {
    let h = harness();
    let job = h
        .service
        .submit(CreateJobRequest::new(TEXT, "ml.txt").with_owner("alice"))
        .await
        .unwrap();

    let status = h.service.status(job.id).await.unwrap();
    assert_eq!(status.status(), JobStatus::Queued);
    assert!(status.result().is_none());
    assert!(status.error().is_none());
    assert_eq!(h.queue.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_blank_submission_creates_nothing() {
    let h = harness();
    let err = h
        .service
        .submit(CreateJobRequest::new("  \n ", "blank.txt"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert!(h.service.list(None, None, None).await.unwrap().is_empty());
    assert!(h.queue.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let h = harness();
    let id = Uuid::new_v4();
    assert!(matches!(h.service.status(id).await, Err(Error::NotFound(_))));
    assert!(matches!(h.service.download(id).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_poll_completes_job_and_enables_download() {
    let h = harness();
    let worker = worker_for(&h);
    let job = h
        .service
        .submit(CreateJobRequest::new(TEXT, "ml.txt"))
        .await
        .unwrap();

    assert!(matches!(
        h.service.download(job.id).await,
        Err(Error::NotReady {
            status: JobStatus::Queued,
            ..
        })
    ));

    assert_eq!(worker.poll_once().await, PollOutcome::Completed(job.id));

    let done = h.service.status(job.id).await.unwrap();
    assert_eq!(done.status(), JobStatus::Completed);
    assert!(done.error().is_none());

    let download = h.service.download(job.id).await.unwrap();
    assert_eq!(download.file_name, "ml_deck.csv");
    assert!(download.content.starts_with("Front,Back\n"));
    assert!(download.content.contains("Artificial Intelligence"));
    assert_eq!(download.content, done.result().unwrap().deck_csv);
}

#[tokio::test]
async fn test_empty_queue_polls_idle() {
    let h = harness();
    assert_eq!(worker_for(&h).poll_once().await, PollOutcome::Idle);
}

#[tokio::test]
async fn test_job_is_processing_while_handler_runs() {
    let h = harness();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let worker = WorkerBuilder::new(h.jobs.clone(), h.queue.clone())
        .with_config(fast_config())
        .with_handler(ObservingHandler {
            jobs: h.jobs.clone(),
            seen: seen.clone(),
        })
        .build();

    let job = h
        .service
        .submit(CreateJobRequest::new(TEXT, "ml.txt"))
        .await
        .unwrap();
    worker.poll_once().await;

    assert_eq!(*seen.lock().unwrap(), vec![JobStatus::Processing]);
    assert_eq!(
        h.jobs.get(job.id).await.unwrap().status(),
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_duplicate_delivery_is_skipped() {
    let h = harness();
    let worker = worker_for(&h);
    let mut events = worker.events();

    let job = h
        .service
        .submit(CreateJobRequest::new(TEXT, "ml.txt"))
        .await
        .unwrap();
    h.queue.enqueue(job.id).await.unwrap();

    assert_eq!(worker.poll_once().await, PollOutcome::Completed(job.id));
    let before = h.jobs.get(job.id).await.unwrap();

    assert_eq!(worker.poll_once().await, PollOutcome::Skipped(job.id));
    assert_eq!(h.jobs.get(job.id).await.unwrap(), before);

    let mut skipped = false;
    while let Ok(event) = events.try_recv() {
        if let WorkerEvent::JobSkipped { job_id, .. } = event {
            skipped = job_id == job.id;
        }
    }
    assert!(skipped);
}

#[tokio::test]
async fn test_dangling_id_is_skipped() {
    let h = harness();
    let worker = worker_for(&h);
    let id = Uuid::new_v4();
    h.queue.enqueue(id).await.unwrap();
    assert_eq!(worker.poll_once().await, PollOutcome::Skipped(id));
}

#[tokio::test]
async fn test_failures_and_panics_do_not_stop_the_worker() {
    let h = harness();
    let worker = WorkerBuilder::new(h.jobs.clone(), h.queue.clone())
        .with_config(fast_config())
        .with_handler(FlakyHandler)
        .build();

    let panics = h
        .service
        .submit(CreateJobRequest::new("PANIC now.", "p.txt"))
        .await
        .unwrap();
    let fails = h
        .service
        .submit(CreateJobRequest::new("FAIL please.", "f.txt"))
        .await
        .unwrap();
    let fine = h
        .service
        .submit(CreateJobRequest::new(TEXT, "ok.txt"))
        .await
        .unwrap();

    assert_eq!(worker.poll_once().await, PollOutcome::Failed(panics.id));
    assert_eq!(worker.poll_once().await, PollOutcome::Failed(fails.id));
    assert_eq!(worker.poll_once().await, PollOutcome::Completed(fine.id));

    let panicked = h.jobs.get(panics.id).await.unwrap();
    assert_eq!(panicked.status(), JobStatus::Failed);
    assert!(panicked.error().unwrap().contains("panicked"));
    assert!(panicked.result().is_none());

    assert_eq!(h.jobs.get(fails.id).await.unwrap().error(), Some("refused"));

    let stats = h.jobs.queue_stats().await.unwrap();
    assert_eq!((stats.failed, stats.completed, stats.total), (2, 1, 3));
}

#[tokio::test]
async fn test_claim_store_error_leaves_job_queued_and_requeued() {
    let jobs = Arc::new(UnreliableRepository {
        inner: MemoryJobRepository::new(),
        failures: AtomicUsize::new(1),
    });
    let queue = Arc::new(MemoryWorkQueue::new());
    let service = SubmissionService::new(jobs.clone(), queue.clone());
    let worker = WorkerBuilder::new(jobs.clone(), queue.clone())
        .with_config(fast_config())
        .build();

    let job = service
        .submit(CreateJobRequest::new(TEXT, "ml.txt"))
        .await
        .unwrap();

    assert_eq!(worker.poll_once().await, PollOutcome::Unavailable);
    assert_eq!(jobs.get(job.id).await.unwrap().status(), JobStatus::Queued);
    assert_eq!(queue.len().await.unwrap(), 1);

    assert_eq!(worker.poll_once().await, PollOutcome::Completed(job.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_running_worker_drains_queue_and_shuts_down() {
    let h = harness();
    let worker = WorkerBuilder::new(h.jobs.clone(), h.queue.clone())
        .with_config(fast_config().with_concurrency(3))
        .build();
    let mut events = worker.events();
    let handle = worker.start();
    assert_eq!(handle.loops(), 3);

    let mut submitted = Vec::new();
    for i in 0..10 {
        let job = h
            .service
            .submit(CreateJobRequest::new(TEXT, format!("doc{i}.txt")).with_owner("bob"))
            .await
            .unwrap();
        submitted.push(job.id);
    }

    let mut done = wait_for_completed(&mut events, submitted.len()).await;
    handle.shutdown().await.unwrap();

    done.sort();
    submitted.sort();
    assert_eq!(done, submitted);

    let listed = h.service.list(Some("bob"), Some(100), None).await.unwrap();
    assert_eq!(listed.len(), 10);
    assert!(listed.iter().all(|j| j.status() == JobStatus::Completed));

    let mut stopped = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, WorkerEvent::WorkerStopped { .. }) {
            stopped += 1;
        }
    }
    assert_eq!(stopped, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_competing_workers_run_each_job_once() {
    let h = harness();
    let first = worker_for(&h);
    let second = worker_for(&h);
    let first_events = first.events();
    let second_events = second.events();

    let mut ids = Vec::new();
    for i in 0..8 {
        let job = h
            .service
            .submit(CreateJobRequest::new(TEXT, format!("doc{i}.txt")))
            .await
            .unwrap();
        // Redelivery: every id is queued twice.
        h.queue.enqueue(job.id).await.unwrap();
        ids.push(job.id);
    }

    let completions = Arc::new(AtomicUsize::new(0));
    let count = |mut rx: tokio::sync::broadcast::Receiver<WorkerEvent>| {
        let completions = completions.clone();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                match event {
                    WorkerEvent::JobCompleted { .. } => {
                        completions.fetch_add(1, Ordering::SeqCst);
                    }
                    WorkerEvent::WorkerStopped { .. } => break,
                    _ => {}
                }
            }
        })
    };
    let a = count(first_events);
    let b = count(second_events);

    let first = first.start();
    let second = second.start();

    tokio::time::timeout(Duration::from_secs(10), async {
        while !h.queue.is_empty().await.unwrap()
            || h.jobs.queue_stats().await.unwrap().completed < ids.len() as i64
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for jobs");

    first.shutdown().await.unwrap();
    second.shutdown().await.unwrap();
    a.await.unwrap();
    b.await.unwrap();

    assert_eq!(completions.load(Ordering::SeqCst), ids.len());
}

#[tokio::test]
async fn test_shutdown_during_dequeue_does_not_strand_job() {
    let jobs = Arc::new(MemoryJobRepository::new());
    let queue = Arc::new(SlowQueue {
        inner: MemoryWorkQueue::new(),
        stall: Duration::from_millis(200),
    });
    let service = SubmissionService::new(jobs.clone(), queue.clone());
    let job = service
        .submit(CreateJobRequest::new(TEXT, "slow.txt"))
        .await
        .unwrap();

    let handle = WorkerBuilder::new(jobs.clone(), queue.clone())
        .with_config(fast_config())
        .build()
        .start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown().await.unwrap();

    let status = jobs.get(job.id).await.unwrap().status();
    let waiting = queue.len().await.unwrap();
    assert!(
        status == JobStatus::Completed || (status == JobStatus::Queued && waiting == 1),
        "job left {status} with {waiting} queued ids"
    );
}

#[tokio::test]
async fn test_enqueue_failure_fails_the_created_job() {
    let jobs = Arc::new(MemoryJobRepository::new());
    let service = SubmissionService::new(jobs.clone(), Arc::new(UnavailableQueue));

    let err = service
        .submit(CreateJobRequest::new(TEXT, "lost.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));

    let listed = jobs.list_by_owner(None, 10, 0).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status(), JobStatus::Failed);
    assert!(listed[0].error().unwrap().contains("queue unavailable"));
}
