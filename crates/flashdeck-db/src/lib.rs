//! # flashdeck-db
//!
//! Job store and work queue backends for flashdeck.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgJobRepository`] and [`PgWorkQueue`] on PostgreSQL
//! - [`MemoryJobRepository`] and [`MemoryWorkQueue`] for tests and
//!   single-process use
//! - Schema migrations
//!
//! ## Example
//!
//! ```rust,ignore
//! use flashdeck_db::{CreateJobRequest, Database, JobRepository, WorkQueue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/flashdeck").await?;
//!     db.migrate().await?;
//!
//!     let job = db.jobs.create(CreateJobRequest::new("Some text.", "notes.txt")).await?;
//!     db.queue.enqueue(job.id).await?;
//!     Ok(())
//! }
//! ```

pub mod jobs;
pub mod memory;
pub mod pool;
pub mod queue;

// Re-export core types
pub use flashdeck_core::*;

pub use jobs::PgJobRepository;
pub use memory::{MemoryJobRepository, MemoryWorkQueue};
pub use pool::PoolConfig;
pub use queue::PgWorkQueue;

/// Database wrapper holding the pool and the Postgres-backed services.
#[derive(Clone)]
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub jobs: PgJobRepository,
    pub queue: PgWorkQueue,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            jobs: PgJobRepository::new(pool.clone()),
            queue: PgWorkQueue::new(pool.clone()),
            pool,
        }
    }

    /// Connect with [`PoolConfig::from_env`].
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, &PoolConfig::from_env()?).await
    }

    pub async fn connect_with(database_url: &str, config: &PoolConfig) -> Result<Self> {
        let pool = config.connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Run pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }
}
