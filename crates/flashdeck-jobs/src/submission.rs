//! Submission side: the operations an outer adapter (HTTP, CLI) calls.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use flashdeck_core::{
    deck_file_name, defaults, CreateJobRequest, DeckDownload, Error, Job, JobRepository, JobState,
    Result, WorkQueue,
};
use flashdeck_text::validate_input;

/// Creates jobs and answers status, download, and listing queries.
#[derive(Clone)]
pub struct SubmissionService {
    jobs: Arc<dyn JobRepository>,
    queue: Arc<dyn WorkQueue>,
}

impl SubmissionService {
    pub fn new(jobs: Arc<dyn JobRepository>, queue: Arc<dyn WorkQueue>) -> Self {
        Self { jobs, queue }
    }

    /// Validate, store as `queued`, and hand the id to the workers.
    ///
    /// Blank text is rejected here with [`Error::Validation`] and no job is created.
    pub async fn submit(&self, req: CreateJobRequest) -> Result<Job> {
        validate_input(&req.payload)?;

        let job = self.jobs.create(req).await?;
        if let Err(e) = self.queue.enqueue(job.id).await {
            warn!(job_id = %job.id, error = %e, "Failed to enqueue job");
            self.abandon(job.id, &format!("Failed to enqueue job: {e}")).await;
            return Err(e);
        }

        info!(
            job_id = %job.id,
            source_name = %job.source_name,
            owner = job.owner.as_deref().unwrap_or("-"),
            "Job submitted"
        );
        Ok(job)
    }

    /// Move a job that no worker will ever see to `failed`.
    ///
    /// Claiming first keeps the transition legal and keeps a late delivery
    /// from running it.
    async fn abandon(&self, job_id: Uuid, reason: &str) {
        let outcome = match self.jobs.claim(job_id).await {
            Ok(_) => self.jobs.fail(job_id, reason).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            error!(%job_id, error = %e, "Failed to mark unqueued job as failed");
        }
    }

    pub async fn status(&self, job_id: Uuid) -> Result<Job> {
        self.jobs.get(job_id).await
    }

    /// The deck as CSV, or [`Error::NotReady`] unless the job completed.
    pub async fn download(&self, job_id: Uuid) -> Result<DeckDownload> {
        let job = self.jobs.get(job_id).await?;
        match &job.state {
            JobState::Completed { result, .. } => Ok(DeckDownload {
                file_name: deck_file_name(&job.source_name),
                content: result.deck_csv.clone(),
            }),
            state => Err(Error::NotReady {
                job_id,
                status: state.status(),
            }),
        }
    }

    /// Jobs newest first; `None` lists every owner.
    pub async fn list(
        &self,
        owner: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Job>> {
        let limit = limit.unwrap_or(defaults::PAGE_LIMIT).max(0);
        let offset = offset.unwrap_or(defaults::PAGE_OFFSET).max(0);
        self.jobs.list_by_owner(owner, limit, offset).await
    }
}
