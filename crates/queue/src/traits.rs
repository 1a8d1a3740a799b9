//! The `JobQueue` abstraction workers pull from.

use async_trait::async_trait;
use prhub_core::{HubResult, Job};

/// Opaque handle identifying an in-flight (dequeued but not yet
/// acknowledged) job, scoped to one queue.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub queue_name: String,
    pub job_id: String,
}

#[derive(Debug, Clone)]
pub struct Dequeued {
    pub handle: JobHandle,
    pub job: Job,
}

/// At-least-once job queue with per-job retry, exponential backoff and
/// dead-letter retention (§4.C). Implementations: [`crate::RedisQueue`] in
/// production, [`crate::InMemoryQueue`] for tests.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> HubResult<()>;

    /// Pulls the next available job from `queue_name`, if any. A job
    /// returned here is invisible to other callers until `ack` or `fail` is
    /// called (or its visibility lease expires and it's requeued).
    async fn dequeue(&self, queue_name: &str) -> HubResult<Option<Dequeued>>;

    /// Marks a job as successfully processed; it enters the
    /// completion-retention window rather than being removed immediately.
    async fn ack(&self, handle: &JobHandle) -> HubResult<()>;

    /// Marks a job as failed. If attempts remain, it's rescheduled after a
    /// backoff delay; otherwise it moves to the failure-retention zone.
    async fn fail(&self, handle: JobHandle, job: Job) -> HubResult<()>;
}
