//! Error types for flashdeck.

use thiserror::Error;
use uuid::Uuid;

use crate::models::JobStatus;

/// Result type alias using flashdeck's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for flashdeck operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Job not found
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// Another worker already moved the job out of `queued`
    #[error("Job already claimed: {0}")]
    AlreadyClaimed(Uuid),

    /// Transition not allowed from the job's current state
    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    StateConflict {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    /// Deck requested for a job that has not completed
    #[error("Job not completed: {job_id} (status: {status})")]
    NotReady { job_id: Uuid, status: JobStatus },

    /// Empty or invalid input text
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unexpected failure while running the text pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Expected outcome of two workers racing for the same job.
    ///
    /// The worker loop absorbs these; they never reach a job's terminal state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::AlreadyClaimed(_) | Error::StateConflict { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
