//! Bounded-concurrency job-loop runner, in the shape of the sidecar's
//! `tokio::spawn`-per-task + `tokio::select!` shutdown pattern: one task per
//! worker slot, each polling its queue in a loop.

use std::sync::Arc;
use std::time::Duration;

use prhub_core::job::Job;
use prhub_queue::{JobHandle, JobQueue};
use tracing::{debug, error, info, warn};

use crate::outcome::JobOutcome;

const EMPTY_QUEUE_BACKOFF: Duration = Duration::from_millis(500);

#[async_trait::async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> JobOutcome;
}

/// Runs `concurrency` loop tasks against `queue_name`, each pulling one job
/// at a time and handing it to `processor`. Runs until `shutdown` resolves.
pub async fn run_worker_pool(
    queue: Arc<dyn JobQueue>,
    processor: Arc<dyn JobProcessor>,
    queue_name: &str,
    concurrency: usize,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut handles = Vec::with_capacity(concurrency);
    for worker_id in 0..concurrency {
        let queue = queue.clone();
        let processor = processor.clone();
        let queue_name = queue_name.to_string();
        let mut shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!(worker_id, queue = %queue_name, "worker stopping");
                            break;
                        }
                    }
                    result = queue.dequeue(&queue_name) => {
                        match result {
                            Ok(Some(dequeued)) => {
                                handle_one(&queue, &processor, dequeued.handle, dequeued.job).await;
                            }
                            Ok(None) => {
                                tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
                            }
                            Err(e) => {
                                error!(worker_id, queue = %queue_name, error = %e, "dequeue failed");
                                tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
                            }
                        }
                    }
                }
            }
        }));
    }

    let _ = shutdown.changed().await;
    for handle in handles {
        let _ = handle.await;
    }
}

async fn handle_one(
    queue: &Arc<dyn JobQueue>,
    processor: &Arc<dyn JobProcessor>,
    handle: JobHandle,
    job: Job,
) {
    debug!(queue_name = %job.queue_name, name = %job.name, "processing job");
    match processor.process(&job).await {
        JobOutcome::Success => {
            if let Err(e) = queue.ack(&handle).await {
                warn!(error = %e, "failed to ack job");
            }
        }
        JobOutcome::Retryable(e) => {
            warn!(error = %e, "job failed with retryable error");
            if let Err(e) = queue.fail(handle, job).await {
                warn!(error = %e, "failed to record job failure");
            }
        }
        JobOutcome::Permanent(e) => {
            error!(error = %e, "job failed permanently");
            let mut job = job;
            job.attempts = job.max_attempts;
            if let Err(e) = queue.fail(handle, job).await {
                warn!(error = %e, "failed to record permanent job failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prhub_core::job::{SummaryJobData, JOB_NAME_GENERATE};
    use prhub_core::HubError;
    use prhub_queue::InMemoryQueue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProcessor {
        calls: Arc<AtomicUsize>,
        outcome: fn() -> JobOutcome,
    }

    #[async_trait::async_trait]
    impl JobProcessor for CountingProcessor {
        async fn process(&self, _job: &Job) -> JobOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

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
    async fn successful_job_is_acked_and_removed_from_in_flight() {
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryQueue::new());
        queue.enqueue(job()).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let processor: Arc<dyn JobProcessor> = Arc::new(CountingProcessor {
            calls: calls.clone(),
            outcome: || JobOutcome::Success,
        });
        let (tx, rx) = tokio::sync::watch::channel(false);

        let handle = tokio::spawn(run_worker_pool(queue.clone(), processor, "pr-summary", 1, rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(true);
        let _ = handle.await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(queue.dequeue("pr-summary").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn permanent_failure_is_dead_lettered_immediately() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.enqueue(job()).await.unwrap();
        let queue_dyn: Arc<dyn JobQueue> = queue.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let processor: Arc<dyn JobProcessor> = Arc::new(CountingProcessor {
            calls: calls.clone(),
            outcome: || JobOutcome::Permanent(HubError::NotFound { reason: "gone".into() }),
        });
        let (tx, rx) = tokio::sync::watch::channel(false);

        let handle = tokio::spawn(run_worker_pool(queue_dyn, processor, "pr-summary", 1, rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(true);
        let _ = handle.await;

        assert_eq!(queue.dead_letter_count().await, 1);
    }
}
