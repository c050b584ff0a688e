//! Background job record (C8). Backed by a Postgres table so the queue
//! survives process restarts without introducing a new infrastructure
//! dependency beyond the `sqlx` pool already used for the cold store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobQueue {
    PersistBid,
    UpdateAuctionMirror,
    FinalizeAuction,
}

impl JobQueue {
    pub fn as_str(self) -> &'static str {
        match self {
            JobQueue::PersistBid => "persist-bid",
            JobQueue::UpdateAuctionMirror => "update-auction-mirror",
            JobQueue::FinalizeAuction => "finalize-auction",
        }
    }

    /// Maximum delivery attempts before a job is marked `failed`.
    pub fn max_attempts(self) -> i32 {
        match self {
            JobQueue::PersistBid => 3,
            JobQueue::UpdateAuctionMirror => 3,
            JobQueue::FinalizeAuction => 5,
        }
    }

    /// Base for the exponential backoff applied between attempts.
    pub fn backoff_base_secs(self) -> i64 {
        match self {
            JobQueue::PersistBid => 2,
            JobQueue::UpdateAuctionMirror => 2,
            JobQueue::FinalizeAuction => 5,
        }
    }

    /// How long a terminal job's row is kept around for debugging.
    pub fn retention(self, status: JobStatus) -> chrono::Duration {
        match (self, status) {
            (_, JobStatus::Done) => chrono::Duration::hours(1),
            (JobQueue::FinalizeAuction, JobStatus::Failed) => chrono::Duration::days(7),
            (_, JobStatus::Failed) => chrono::Duration::hours(24),
            _ => chrono::Duration::zero(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InFlight,
    Done,
    Failed,
}

/// A queued unit of work. `job_key` is the natural idempotency key
/// (`bid-{auction}-{bidder}-{micros}`, `finalize-{auction}`, …) so
/// redelivery is coalesced at enqueue time via `ON CONFLICT DO NOTHING`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_key: String,
    pub queue: JobQueue,
    pub payload: Value,
    pub attempts: i32,
    pub max_attempts: i32,
    pub status: JobStatus,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(job_key: impl Into<String>, queue: JobQueue, payload: Value, run_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            job_key: job_key.into(),
            queue,
            payload,
            attempts: 0,
            max_attempts: queue.max_attempts(),
            status: JobStatus::Pending,
            run_at,
            created_at: now,
            completed_at: None,
        }
    }

    /// Exponential backoff with a small jitter, capped implicitly by
    /// `max_attempts` exhausting the retry budget.
    pub fn next_run_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let exp = self.attempts.max(1) as u32;
        let base = self.queue.backoff_base_secs();
        let delay = base.saturating_mul(1i64 << exp.min(10));
        let jitter = rand::random::<u8>() as i64 % (base.max(1));
        now + chrono::Duration::seconds(delay + jitter)
    }
}
