//! Job state machine: `queued -> processing -> {completed | failed}`.
//!
//! Store implementations apply these transitions while holding whatever
//! per-record exclusion they provide (a write lock, a conditional UPDATE),
//! so the checks here are the single definition of which moves are legal.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{Job, JobState, JobStatus, PipelineResult};

impl Job {
    /// Claim: the only transition out of `queued`.
    ///
    /// Any other current state means some worker already owns (or finished)
    /// the job, reported as [`Error::AlreadyClaimed`].
    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.state {
            JobState::Queued => {
                self.state = JobState::Processing { started_at: now };
                self.updated_at = now;
                Ok(())
            }
            _ => Err(Error::AlreadyClaimed(self.id)),
        }
    }

    /// Store the pipeline result. Allowed only from `processing`.
    pub fn complete(&mut self, result: PipelineResult, now: DateTime<Utc>) -> Result<()> {
        let started_at = self.require_processing(JobStatus::Completed)?;
        self.state = JobState::Completed {
            started_at,
            completed_at: now,
            result: Box::new(result),
        };
        self.updated_at = now;
        Ok(())
    }

    /// Record a failure description. Allowed only from `processing`.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        let started_at = self.require_processing(JobStatus::Failed)?;
        self.state = JobState::Failed {
            started_at,
            failed_at: now,
            error: error.into(),
        };
        self.updated_at = now;
        Ok(())
    }

    fn require_processing(&self, to: JobStatus) -> Result<DateTime<Utc>> {
        match self.state {
            JobState::Processing { started_at } => Ok(started_at),
            _ => Err(Error::StateConflict {
                job_id: self.id,
                from: self.status(),
                to,
            }),
        }
    }
}
