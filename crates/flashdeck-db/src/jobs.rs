//! PostgreSQL job store.
//!
//! Every transition is a single conditional `UPDATE ... WHERE state = <from>`,
//! so the database row lock is the compare-and-set. When no row matches, a
//! follow-up read decides between `NotFound` and a conflict error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use flashdeck_core::{
    CreateJobRequest, Error, Job, JobRepository, JobState, JobStatus, PipelineResult, QueueStats,
    Result,
};

const JOB_COLUMNS: &str = "id, owner, source_name, payload, state, result, error, \
                           created_at, updated_at, started_at, finished_at";

/// PostgreSQL implementation of [`JobRepository`].
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Rebuild the tagged state from the flat row.
    fn parse_job_row(row: &PgRow) -> Result<Job> {
        let id: Uuid = row.try_get("id")?;
        let status: JobStatus = row.try_get::<String, _>("state")?.parse()?;
        let started_at: Option<DateTime<Utc>> = row.try_get("started_at")?;
        let finished_at: Option<DateTime<Utc>> = row.try_get("finished_at")?;

        let missing = |column: &str| {
            Error::Internal(format!("job {id} in state {status} has no {column}"))
        };

        let state = match status {
            JobStatus::Queued => JobState::Queued,
            JobStatus::Processing => JobState::Processing {
                started_at: started_at.ok_or_else(|| missing("started_at"))?,
            },
            JobStatus::Completed => {
                let value: Option<JsonValue> = row.try_get("result")?;
                let result: PipelineResult =
                    serde_json::from_value(value.ok_or_else(|| missing("result"))?)?;
                JobState::Completed {
                    started_at: started_at.ok_or_else(|| missing("started_at"))?,
                    completed_at: finished_at.ok_or_else(|| missing("finished_at"))?,
                    result: Box::new(result),
                }
            }
            JobStatus::Failed => {
                let error: Option<String> = row.try_get("error")?;
                JobState::Failed {
                    started_at: started_at.ok_or_else(|| missing("started_at"))?,
                    failed_at: finished_at.ok_or_else(|| missing("finished_at"))?,
                    error: error.ok_or_else(|| missing("error"))?,
                }
            }
        };

        Ok(Job {
            id,
            owner: row.try_get("owner")?,
            source_name: row.try_get("source_name")?,
            payload: row.try_get("payload")?,
            state,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn current_status(&self, job_id: Uuid) -> Result<Option<JobStatus>> {
        let state: Option<String> = sqlx::query_scalar("SELECT state FROM deck_job WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        state.map(|s| s.parse()).transpose()
    }

    /// Explain why a `processing -> to` update matched no row.
    async fn terminal_conflict(&self, job_id: Uuid, to: JobStatus) -> Error {
        match self.current_status(job_id).await {
            Ok(Some(from)) => Error::StateConflict { job_id, from, to },
            Ok(None) => Error::NotFound(job_id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn create(&self, req: CreateJobRequest) -> Result<Job> {
        let job_id = Uuid::now_v7();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO deck_job (id, owner, source_name, payload, state, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'queued', $5, $5)
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(&req.owner)
        .bind(&req.source_name)
        .bind(&req.payload)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Self::parse_job_row(&row)
    }

    async fn get(&self, job_id: Uuid) -> Result<Job> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM deck_job WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound(job_id))?;

        Self::parse_job_row(&row)
    }

    async fn claim(&self, job_id: Uuid) -> Result<Job> {
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "UPDATE deck_job
             SET state = 'processing', started_at = $2, updated_at = $2
             WHERE id = $1 AND state = 'queued'
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::parse_job_row(&row),
            None => match self.current_status(job_id).await? {
                Some(status) => {
                    debug!(%job_id, %status, "Claim lost");
                    Err(Error::AlreadyClaimed(job_id))
                }
                None => Err(Error::NotFound(job_id)),
            },
        }
    }

    async fn complete(&self, job_id: Uuid, result: PipelineResult) -> Result<Job> {
        let now = Utc::now();
        let value = serde_json::to_value(&result)?;

        let row = sqlx::query(&format!(
            "UPDATE deck_job
             SET state = 'completed', result = $2, finished_at = $3, updated_at = $3
             WHERE id = $1 AND state = 'processing'
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(value)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::parse_job_row(&row),
            None => Err(self.terminal_conflict(job_id, JobStatus::Completed).await),
        }
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<Job> {
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "UPDATE deck_job
             SET state = 'failed', error = $2, finished_at = $3, updated_at = $3
             WHERE id = $1 AND state = 'processing'
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(error)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::parse_job_row(&row),
            None => Err(self.terminal_conflict(job_id, JobStatus::Failed).await),
        }
    }

    async fn list_by_owner(
        &self,
        owner: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM deck_job
             WHERE ($1::text IS NULL OR owner = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_job_row).collect()
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE state = 'queued') AS queued,
                COUNT(*) FILTER (WHERE state = 'processing') AS processing,
                COUNT(*) FILTER (WHERE state = 'completed') AS completed,
                COUNT(*) FILTER (WHERE state = 'failed') AS failed,
                COUNT(*) AS total
             FROM deck_job",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStats {
            queued: row.try_get("queued")?,
            processing: row.try_get("processing")?,
            completed: row.try_get("completed")?,
            failed: row.try_get("failed")?,
            total: row.try_get("total")?,
        })
    }
}
