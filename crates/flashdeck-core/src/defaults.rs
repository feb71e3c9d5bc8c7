//! Centralized default constants for flashdeck.
//!
//! Every crate reads its defaults from here instead of defining its own
//! magic numbers. Environment variables override most of these at startup.

// =============================================================================
// TEXT PIPELINE
// =============================================================================

/// Number of sentences selected for the extractive summary.
pub const SUMMARY_SENTENCES: usize = 3;

/// Maximum keywords extracted per document (one card each).
pub const MAX_KEYWORDS: usize = 10;

/// Maximum entities reported per document (one card each).
pub const MAX_ENTITIES: usize = 20;

/// Tokens shorter than this are ignored for frequency and keyword scoring.
pub const MIN_TERM_LEN: usize = 3;

/// All-uppercase tokens shorter than this are only entities when repeated.
pub const ACRONYM_MIN_LEN: usize = 3;

/// Occurrences needed before a short acronym counts as an entity.
pub const ACRONYM_MIN_REPEATS: usize = 2;

/// Front text of the whole-document summary card.
pub const SUMMARY_CARD_FRONT: &str = "Summary";

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Longest single wait on an empty queue (milliseconds).
pub const DEQUEUE_TIMEOUT_MS: u64 = 30_000;

/// Pause after a store or queue error before polling again (milliseconds).
pub const ERROR_BACKOFF_MS: u64 = 5_000;

/// Independent worker loops per process.
pub const WORKER_CONCURRENCY: usize = 1;

/// Poll interval for backends without push notification (milliseconds).
pub const QUEUE_POLL_INTERVAL_MS: u64 = 250;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// DATABASE
// =============================================================================

/// Connections shared by the store and the queue.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Connections kept open while idle.
pub const DB_MIN_CONNECTIONS: u32 = 1;

/// How long a query waits for a free connection (seconds).
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for job listings.
pub const PAGE_LIMIT: i64 = 50;

/// Default page offset.
pub const PAGE_OFFSET: i64 = 0;
