//! In-process `JobQueue` implementation backed by per-queue `VecDeque`s.
//! Used by tests and by workers run without a Redis dependency.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use prhub_core::{HubResult, Job};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backoff::RetryPolicy;
use crate::traits::{Dequeued, JobHandle, JobQueue};

#[derive(Default)]
struct Queues {
    ready: HashMap<String, VecDeque<(String, Job)>>,
    in_flight: HashMap<String, Job>,
    dead_letter: Vec<Job>,
}

pub struct InMemoryQueue {
    queues: Arc<Mutex<Queues>>,
    retry_policy: RetryPolicy,
}

impl InMemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(Queues::default())),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Number of jobs moved to the dead-letter zone so far; exposed for
    /// tests that assert on retry exhaustion.
    pub async fn dead_letter_count(&self) -> usize {
        self.queues.lock().await.dead_letter.len()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, job: Job) -> HubResult<()> {
        let job_id = Uuid::new_v4().to_string();
        let mut queues = self.queues.lock().await;
        queues
            .ready
            .entry(job.queue_name.clone())
            .or_default()
            .push_back((job_id, job));
        Ok(())
    }

    async fn dequeue(&self, queue_name: &str) -> HubResult<Option<Dequeued>> {
        let mut queues = self.queues.lock().await;
        let Some((job_id, job)) = queues
            .ready
            .get_mut(queue_name)
            .and_then(VecDeque::pop_front)
        else {
            return Ok(None);
        };
        queues.in_flight.insert(job_id.clone(), job.clone());
        Ok(Some(Dequeued {
            handle: JobHandle {
                queue_name: queue_name.to_string(),
                job_id,
            },
            job,
        }))
    }

    async fn ack(&self, handle: &JobHandle) -> HubResult<()> {
        self.queues.lock().await.in_flight.remove(&handle.job_id);
        Ok(())
    }

    async fn fail(&self, handle: JobHandle, mut job: Job) -> HubResult<()> {
        self.queues.lock().await.in_flight.remove(&handle.job_id);
        job.attempts += 1;

        if job.attempts >= job.max_attempts {
            warn!(
                queue = %handle.queue_name,
                job_name = %job.name,
                attempts = job.attempts,
                "job exhausted retries, moving to dead-letter zone"
            );
            self.queues.lock().await.dead_letter.push(job);
            return Ok(());
        }

        let delay = self.retry_policy.backoff_for(job.attempts);
        info!(
            queue = %handle.queue_name,
            job_name = %job.name,
            attempt = job.attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling job retry"
        );

        let queues = Arc::clone(&self.queues);
        let queue_name = handle.queue_name;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let job_id = Uuid::new_v4().to_string();
            queues
                .lock()
                .await
                .ready
                .entry(queue_name)
                .or_default()
                .push_back((job_id, job));
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prhub_core::job::{SummaryJobData, JOB_NAME_GENERATE};

    fn job() -> Job {
        Job::new_summary(
            JOB_NAME_GENERATE,
            SummaryJobData {
                pull_request_id: "1".into(),
                installation_id: 1,
                repo_full_name: "acme/widgets".into(),
                number: 7,
            },
        )
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_round_trips() {
        let queue = InMemoryQueue::new();
        queue.enqueue(job()).await.unwrap();
        let dequeued = queue.dequeue("pr-summary").await.unwrap().unwrap();
        assert_eq!(dequeued.job.name, JOB_NAME_GENERATE);
        queue.ack(&dequeued.handle).await.unwrap();
    }

    #[tokio::test]
    async fn empty_queue_returns_none() {
        let queue = InMemoryQueue::new();
        assert!(queue.dequeue("pr-summary").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_job_exhausting_retries_goes_to_dead_letter() {
        let queue = InMemoryQueue::new();
        let mut j = job();
        j.attempts = 2; // next failure is attempt 3 == max_attempts
        let handle = JobHandle {
            queue_name: "pr-summary".to_string(),
            job_id: "x".to_string(),
        };
        queue.fail(handle, j).await.unwrap();
        assert_eq!(queue.dead_letter_count().await, 1);
    }
}
