//! # flashdeck-jobs
//!
//! Background deck generation for flashdeck.
//!
//! This crate provides:
//! - The worker loop: blocking dequeue, atomic claim, pipeline run, terminal write
//! - Worker events via a broadcast channel and graceful shutdown
//! - [`SubmissionService`], the submit/status/download/list surface for adapters
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use flashdeck_db::{MemoryJobRepository, MemoryWorkQueue};
//! use flashdeck_jobs::{CreateJobRequest, SubmissionService, WorkerBuilder, WorkerConfig};
//!
//! let jobs = Arc::new(MemoryJobRepository::new());
//! let queue = Arc::new(MemoryWorkQueue::new());
//!
//! let handle = WorkerBuilder::new(jobs.clone(), queue.clone())
//!     .with_config(WorkerConfig::default().with_concurrency(2))
//!     .build()
//!     .start();
//!
//! let service = SubmissionService::new(jobs, queue);
//! let job = service.submit(CreateJobRequest::new("Some text.", "notes.txt")).await?;
//!
//! // ... later
//! let deck = service.download(job.id).await?;
//! handle.shutdown().await?;
//! ```

pub mod handler;
pub mod submission;
pub mod worker;

// Re-export core types
pub use flashdeck_core::*;

pub use handler::{DeckHandler, JobContext, JobHandler, JobResult};
pub use submission::SubmissionService;
pub use worker::{JobWorker, PollOutcome, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
