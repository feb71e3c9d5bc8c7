//! In-process job store and work queue.
//!
//! Used by tests and by single-process embeddings that do not need
//! durability. The store's write lock is the claim's compare-and-set.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use flashdeck_core::{
    CreateJobRequest, Error, Job, JobRepository, JobState, JobStatus, PipelineResult, QueueStats,
    Result, WorkQueue,
};

#[derive(Default)]
struct JobTable {
    jobs: HashMap<Uuid, Job>,
    /// Ids in creation order.
    order: Vec<Uuid>,
}

/// [`JobRepository`] backed by a `HashMap` behind a `RwLock`.
#[derive(Default)]
pub struct MemoryJobRepository {
    table: RwLock<JobTable>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `transition` to the stored job under the write lock.
    async fn update(
        &self,
        job_id: Uuid,
        transition: impl FnOnce(&mut Job) -> Result<()> + Send,
    ) -> Result<Job> {
        let mut table = self.table.write().await;
        let job = table.jobs.get_mut(&job_id).ok_or(Error::NotFound(job_id))?;
        transition(job)?;
        Ok(job.clone())
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn create(&self, req: CreateJobRequest) -> Result<Job> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::now_v7(),
            owner: req.owner,
            source_name: req.source_name,
            payload: req.payload,
            state: JobState::Queued,
            created_at: now,
            updated_at: now,
        };

        let mut table = self.table.write().await;
        table.order.push(job.id);
        table.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, job_id: Uuid) -> Result<Job> {
        self.table
            .read()
            .await
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(Error::NotFound(job_id))
    }

    async fn claim(&self, job_id: Uuid) -> Result<Job> {
        self.update(job_id, |job| job.begin_processing(Utc::now()))
            .await
    }

    async fn complete(&self, job_id: Uuid, result: PipelineResult) -> Result<Job> {
        self.update(job_id, |job| job.complete(result, Utc::now()))
            .await
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<Job> {
        let error = error.to_string();
        self.update(job_id, |job| job.fail(error, Utc::now())).await
    }

    async fn list_by_owner(
        &self,
        owner: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>> {
        let table = self.table.read().await;
        Ok(table
            .order
            .iter()
            .rev()
            .filter_map(|id| table.jobs.get(id))
            .filter(|job| owner.is_none() || job.owner.as_deref() == owner)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let table = self.table.read().await;
        let mut stats = QueueStats::default();
        for job in table.jobs.values() {
            match job.status() {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
            stats.total += 1;
        }
        Ok(stats)
    }
}

/// [`WorkQueue`] backed by a `VecDeque`; waiters park on a [`Notify`].
#[derive(Default)]
pub struct MemoryWorkQueue {
    items: Mutex<VecDeque<Uuid>>,
    notify: Notify,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<()> {
        self.items.lock().await.push_back(job_id);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<Uuid>> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking, so an enqueue in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job_id) = self.try_dequeue().await? {
                return Ok(Some(job_id));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let _ = tokio::time::timeout(deadline - now, notified).await;
        }
    }

    async fn try_dequeue(&self) -> Result<Option<Uuid>> {
        Ok(self.items.lock().await.pop_front())
    }

    async fn wait_for_work(&self, timeout: Duration) -> Result<()> {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.items.lock().await.len())
    }
}
