//! What a worker runs for each claimed job.

use async_trait::async_trait;
use uuid::Uuid;

use flashdeck_core::{Error, Job, PipelineResult};
use flashdeck_text::{PipelineConfig, TextPipeline};

/// Context provided to job handlers.
pub struct JobContext {
    /// The claimed job, already in `processing`.
    pub job: Job,
}

impl JobContext {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    pub fn payload(&self) -> &str {
        &self.job.payload
    }

    pub fn source_name(&self) -> &str {
        &self.job.source_name
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    Success(PipelineResult),
    /// Error description recorded on the job.
    Failed(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;
}

/// Runs the text pipeline over the job payload.
///
/// The pipeline is CPU-bound, so it runs on the blocking pool. A panic inside
/// it becomes [`JobResult::Failed`].
#[derive(Debug, Clone, Default)]
pub struct DeckHandler {
    pipeline: TextPipeline,
}

impl DeckHandler {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            pipeline: TextPipeline::new(config),
        }
    }
}

#[async_trait]
impl JobHandler for DeckHandler {
    fn name(&self) -> &'static str {
        "deck"
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let pipeline = self.pipeline.clone();
        let JobContext { job } = ctx;

        let outcome = tokio::task::spawn_blocking(move || {
            pipeline.process(&job.payload, &job.source_name)
        })
        .await;

        match outcome {
            Ok(Ok(result)) => JobResult::Success(result),
            Ok(Err(e)) => JobResult::Failed(e.to_string()),
            Err(join_error) => JobResult::Failed(
                Error::Pipeline(format!("panicked: {join_error}")).to_string(),
            ),
        }
    }
}
