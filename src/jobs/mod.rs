//! Background Job Runner (C8).
//!
//! A durable, at-least-once queue backed by the same Postgres pool as the
//! cold store (no new infrastructure dependency). Workers claim batches with
//! `FOR UPDATE SKIP LOCKED` so multiple instances can drain a queue without
//! double-processing a row, and retry with exponential backoff up to each
//! queue's `max_attempts`. Jobs never make authorization or admission
//! decisions — they are write-down pipelines onto truth already committed
//! in the hot store.

pub mod handlers;
pub mod payloads;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::job::{Job, JobQueue, JobStatus};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A queue-specific unit of work. Implementations must be idempotent: the
/// same job may be delivered more than once.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

pub struct JobRunner {
    pool: PgPool,
}

impl JobRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a job. Redelivery under the same `job_key` is coalesced by
    /// the `ON CONFLICT DO NOTHING`, matching the spec's "natural keys so
    /// redelivery is coalesced" requirement.
    #[tracing::instrument(skip(self, job))]
    pub async fn enqueue(&self, job: Job) -> Result<(), JobError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (job_key, queue, payload, attempts, max_attempts, status, run_at, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (job_key) DO NOTHING
            "#,
        )
        .bind(&job.job_key)
        .bind(job.queue.as_str())
        .bind(&job.payload)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(status_str(job.status))
        .bind(job.run_at)
        .bind(job.created_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_batch(&self, queue: JobQueue, limit: i64) -> Result<Vec<Job>, JobError> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            UPDATE jobs SET status = 'in_flight'
            WHERE job_key IN (
                SELECT job_key FROM jobs
                WHERE queue = $1 AND status = 'pending' AND run_at <= now()
                ORDER BY run_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING job_key, queue, payload, attempts, max_attempts, status, run_at, created_at, completed_at
            "#,
        )
        .bind(queue.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    async fn mark_done(&self, job: &Job) -> Result<(), JobError> {
        sqlx::query("UPDATE jobs SET status = 'done', completed_at = $2 WHERE job_key = $1")
            .bind(&job.job_key)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_retry_or_fail(&self, job: &Job) -> Result<(), JobError> {
        let attempts = job.attempts + 1;
        if attempts >= job.max_attempts {
            warn!(job_key = %job.job_key, "job exhausted retries, marking failed");
            sqlx::query("UPDATE jobs SET status = 'failed', attempts = $2, completed_at = $3 WHERE job_key = $1")
                .bind(&job.job_key)
                .bind(attempts)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
        } else {
            let next_run_at = job.next_run_at(Utc::now());
            sqlx::query("UPDATE jobs SET status = 'pending', attempts = $2, run_at = $3 WHERE job_key = $1")
                .bind(&job.job_key)
                .bind(attempts)
                .bind(next_run_at)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Spawn the polling loop for one queue. Returns immediately; the
    /// worker runs for the lifetime of the returned handle.
    pub fn spawn_worker(self: Arc<Self>, queue: JobQueue, handler: Arc<dyn JobHandler>) -> tokio::task::JoinHandle<()> {
        let runner = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(250));
            loop {
                interval.tick().await;
                let batch = match runner.claim_batch(queue, 32).await {
                    Ok(batch) => batch,
                    Err(err) => {
                        error!(?err, ?queue, "failed to claim job batch");
                        continue;
                    }
                };
                for job in batch {
                    match handler.handle(&job).await {
                        Ok(()) => {
                            if let Err(err) = runner.mark_done(&job).await {
                                error!(?err, job_key = %job.job_key, "failed to mark job done");
                            }
                        }
                        Err(err) => {
                            error!(?err, job_key = %job.job_key, "job handler failed");
                            if let Err(err) = runner.mark_retry_or_fail(&job).await {
                                error!(?err, job_key = %job.job_key, "failed to schedule retry");
                            }
                        }
                    }
                }
            }
        })
    }
}

pub fn job_key_for_bid(auction_id: uuid::Uuid, bidder_id: uuid::Uuid, server_time: chrono::DateTime<Utc>) -> String {
    format!("bid-{auction_id}-{bidder_id}-{}", server_time.timestamp_micros())
}

pub fn job_key_for_mirror(auction_id: uuid::Uuid, total_bids: i64) -> String {
    format!("mirror-{auction_id}-{total_bids}")
}

pub fn job_key_for_finalize(auction_id: uuid::Uuid) -> String {
    format!("finalize-{auction_id}")
}

#[derive(sqlx::FromRow)]
struct JobRow {
    job_key: String,
    queue: String,
    payload: serde_json::Value,
    attempts: i32,
    max_attempts: i32,
    status: String,
    run_at: chrono::DateTime<Utc>,
    created_at: chrono::DateTime<Utc>,
    completed_at: Option<chrono::DateTime<Utc>>,
}

impl JobRow {
    fn into_job(self) -> Job {
        Job {
            job_key: self.job_key,
            queue: parse_queue(&self.queue),
            payload: self.payload,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            status: parse_status(&self.status),
            run_at: self.run_at,
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

fn parse_queue(s: &str) -> JobQueue {
    match s {
        "persist-bid" => JobQueue::PersistBid,
        "update-auction-mirror" => JobQueue::UpdateAuctionMirror,
        "finalize-auction" => JobQueue::FinalizeAuction,
        other => unreachable!("unknown job queue persisted: {other}"),
    }
}

fn parse_status(s: &str) -> JobStatus {
    match s {
        "pending" => JobStatus::Pending,
        "in_flight" => JobStatus::InFlight,
        "done" => JobStatus::Done,
        "failed" => JobStatus::Failed,
        other => unreachable!("unknown job status persisted: {other}"),
    }
}

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::InFlight => "in_flight",
        JobStatus::Done => "done",
        JobStatus::Failed => "failed",
    }
}
