//! PostgreSQL work queue.
//!
//! Dequeue deletes the lowest `seq` row under `FOR UPDATE SKIP LOCKED`, so
//! concurrent workers never receive the same entry. Waiting is a poll loop
//! that an in-process [`Notify`] can cut short.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;
use uuid::Uuid;

use flashdeck_core::{defaults, Result, WorkQueue};

/// PostgreSQL implementation of [`WorkQueue`].
#[derive(Clone)]
pub struct PgWorkQueue {
    pool: Pool<Postgres>,
    notify: Arc<Notify>,
    poll_interval: Duration,
}

impl PgWorkQueue {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
            poll_interval: Duration::from_millis(defaults::QUEUE_POLL_INTERVAL_MS),
        }
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<()> {
        sqlx::query("INSERT INTO deck_work_queue (job_id) VALUES ($1)")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        self.notify.notify_waiters();
        Ok(())
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<Uuid>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(job_id) = self.try_dequeue().await? {
                return Ok(Some(job_id));
            }

            let now = Instant::now();
            if now >= deadline {
                trace!(timeout_ms = timeout.as_millis() as u64, "Work queue empty");
                return Ok(None);
            }
            self.wait_for_work(deadline - now).await?;
        }
    }

    async fn try_dequeue(&self) -> Result<Option<Uuid>> {
        let job_id = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM deck_work_queue
             WHERE seq = (
                 SELECT seq FROM deck_work_queue
                 ORDER BY seq
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING job_id",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(job_id)
    }

    /// Other processes' enqueues are only seen by polling, so the wait is
    /// capped at the poll interval.
    async fn wait_for_work(&self, timeout: Duration) -> Result<()> {
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(self.poll_interval.min(timeout)) => {}
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM deck_work_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }
}
