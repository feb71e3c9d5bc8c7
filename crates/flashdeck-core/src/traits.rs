//! Service interfaces shared by the submission side and the workers.
//!
//! Both are injected as trait objects so tests can substitute the in-memory
//! implementations for the Postgres ones.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CreateJobRequest, Job, PipelineResult, QueueStats};

/// Durable record of each job's state and payload/result, keyed by job id.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Allocate an id and store a new job in `queued`.
    async fn create(&self, req: CreateJobRequest) -> Result<Job>;

    /// Fetch a job, or [`Error::NotFound`](crate::Error::NotFound).
    async fn get(&self, job_id: Uuid) -> Result<Job>;

    /// Atomically move a job from `queued` to `processing`.
    ///
    /// Exactly one of any number of concurrent callers succeeds; the rest get
    /// [`Error::AlreadyClaimed`](crate::Error::AlreadyClaimed).
    async fn claim(&self, job_id: Uuid) -> Result<Job>;

    /// `processing -> completed`, storing the result.
    async fn complete(&self, job_id: Uuid, result: PipelineResult) -> Result<Job>;

    /// `processing -> failed`, storing the error description.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<Job>;

    /// List jobs newest first, all of them when `owner` is `None`.
    async fn list_by_owner(&self, owner: Option<&str>, limit: i64, offset: i64)
        -> Result<Vec<Job>>;

    /// Counts per state.
    async fn queue_stats(&self) -> Result<QueueStats>;
}

/// FIFO hand-off of job ids to workers.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append a job id.
    async fn enqueue(&self, job_id: Uuid) -> Result<()>;

    /// Remove and return the oldest id, waiting up to `timeout` for one.
    ///
    /// `Ok(None)` means the timeout elapsed on an empty queue. Dropping the
    /// future after the id was removed loses that id; callers that may be
    /// cancelled use [`try_dequeue`](Self::try_dequeue) and
    /// [`wait_for_work`](Self::wait_for_work) instead.
    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<Uuid>>;

    /// Remove and return the oldest id without waiting.
    async fn try_dequeue(&self) -> Result<Option<Uuid>>;

    /// Return once an id may be available, or after `timeout`.
    ///
    /// Never removes an id, so it is safe to drop mid-wait. Wakeups may be
    /// spurious.
    async fn wait_for_work(&self, timeout: Duration) -> Result<()>;

    /// Number of ids waiting.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
