//! Redis-backed `JobQueue`. Ready jobs live in a list per queue name;
//! in-flight jobs move to a processing hash keyed by job id so a crashed
//! worker's jobs can be detected as stalled and requeued; failed jobs either
//! reschedule into a delayed sorted set or land in a dead-letter list.

use async_trait::async_trait;
use chrono::Utc;
use prhub_core::{HubError, HubResult, Job};
use redis::AsyncCommands;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backoff::RetryPolicy;
use crate::traits::{Dequeued, JobHandle, JobQueue};

const COMPLETION_RETENTION_SECS: i64 = 24 * 60 * 60;
const FAILURE_RETENTION_SECS: i64 = 7 * 24 * 60 * 60;

pub struct RedisQueue {
    client: redis::Client,
    retry_policy: RetryPolicy,
}

impl RedisQueue {
    /// # Errors
    ///
    /// Returns [`HubError::QueueError`] if the connection URL is invalid.
    pub fn new(host: &str, port: u16, password: Option<&str>) -> HubResult<Self> {
        let url = match password {
            Some(pw) => format!("redis://:{pw}@{host}:{port}"),
            None => format!("redis://{host}:{port}"),
        };
        let client = redis::Client::open(url).map_err(|e| HubError::QueueError {
            reason: format!("invalid redis url: {e}"),
        })?;
        Ok(Self {
            client,
            retry_policy: RetryPolicy::default(),
        })
    }

    async fn conn(&self) -> HubResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| HubError::QueueError {
                reason: format!("redis connection failed: {e}"),
            })
    }

    fn ready_key(queue_name: &str) -> String {
        format!("prhub:queue:{queue_name}:ready")
    }

    fn processing_key(queue_name: &str) -> String {
        format!("prhub:queue:{queue_name}:processing")
    }

    fn delayed_key(queue_name: &str) -> String {
        format!("prhub:queue:{queue_name}:delayed")
    }

    fn dead_letter_key(queue_name: &str) -> String {
        format!("prhub:queue:{queue_name}:dead")
    }

    fn completed_key(queue_name: &str, job_id: &str) -> String {
        format!("prhub:queue:{queue_name}:completed:{job_id}")
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: Job) -> HubResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&job)?;
        let _: () = conn
            .lpush(Self::ready_key(&job.queue_name), payload)
            .await
            .map_err(|e| HubError::QueueError {
                reason: format!("enqueue failed: {e}"),
            })?;
        Ok(())
    }

    async fn dequeue(&self, queue_name: &str) -> HubResult<Option<Dequeued>> {
        let mut conn = self.conn().await?;

        // Promote any delayed jobs whose backoff has elapsed before polling
        // the ready list.
        let now = Utc::now().timestamp();
        let due: Vec<String> = conn
            .zrangebyscore(Self::delayed_key(queue_name), 0, now)
            .await
            .map_err(|e| HubError::QueueError {
                reason: format!("delayed scan failed: {e}"),
            })?;
        for payload in due {
            let _: () = conn
                .zrem(Self::delayed_key(queue_name), &payload)
                .await
                .map_err(|e| HubError::QueueError {
                    reason: format!("delayed promote failed: {e}"),
                })?;
            let _: () = conn
                .lpush(Self::ready_key(queue_name), payload)
                .await
                .map_err(|e| HubError::QueueError {
                    reason: format!("delayed promote failed: {e}"),
                })?;
        }

        let payload: Option<String> = conn
            .rpop(Self::ready_key(queue_name), None)
            .await
            .map_err(|e| HubError::QueueError {
                reason: format!("dequeue failed: {e}"),
            })?;
        let Some(payload) = payload else {
            return Ok(None);
        };

        let job: Job = serde_json::from_str(&payload)?;
        let job_id = Uuid::new_v4().to_string();
        let _: () = conn
            .hset(Self::processing_key(queue_name), &job_id, &payload)
            .await
            .map_err(|e| HubError::QueueError {
                reason: format!("mark in-flight failed: {e}"),
            })?;

        Ok(Some(Dequeued {
            handle: JobHandle {
                queue_name: queue_name.to_string(),
                job_id,
            },
            job,
        }))
    }

    async fn ack(&self, handle: &JobHandle) -> HubResult<()> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn
            .hget(Self::processing_key(&handle.queue_name), &handle.job_id)
            .await
            .map_err(|e| HubError::QueueError {
                reason: format!("ack lookup failed: {e}"),
            })?;
        let _: () = conn
            .hdel(Self::processing_key(&handle.queue_name), &handle.job_id)
            .await
            .map_err(|e| HubError::QueueError {
                reason: format!("ack failed: {e}"),
            })?;

        // Completed jobs move into their own key with a 24h TTL rather than
        // being dropped outright, so a completion can still be replayed for
        // observability within the retention window.
        if let Some(payload) = payload {
            let _: () = conn
                .set_ex(
                    Self::completed_key(&handle.queue_name, &handle.job_id),
                    payload,
                    COMPLETION_RETENTION_SECS as u64,
                )
                .await
                .map_err(|e| HubError::QueueError {
                    reason: format!("completion retention write failed: {e}"),
                })?;
        }
        Ok(())
    }

    async fn fail(&self, handle: JobHandle, mut job: Job) -> HubResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .hdel(Self::processing_key(&handle.queue_name), &handle.job_id)
            .await
            .map_err(|e| HubError::QueueError {
                reason: format!("fail cleanup failed: {e}"),
            })?;

        job.attempts += 1;

        if job.attempts >= job.max_attempts {
            warn!(
                queue = %handle.queue_name,
                job_name = %job.name,
                attempts = job.attempts,
                "job exhausted retries, moving to dead-letter zone"
            );
            let payload = serde_json::to_string(&job)?;
            let _: () = conn
                .lpush(Self::dead_letter_key(&handle.queue_name), payload)
                .await
                .map_err(|e| HubError::QueueError {
                    reason: format!("dead-letter push failed: {e}"),
                })?;
            let _: () = conn
                .expire(Self::dead_letter_key(&handle.queue_name), FAILURE_RETENTION_SECS)
                .await
                .map_err(|e| HubError::QueueError {
                    reason: format!("dead-letter expiry failed: {e}"),
                })?;
            return Ok(());
        }

        let delay = self.retry_policy.backoff_for(job.attempts);
        let ready_at = Utc::now().timestamp() + delay.as_secs() as i64;
        info!(
            queue = %handle.queue_name,
            job_name = %job.name,
            attempt = job.attempts,
            delay_secs = delay.as_secs(),
            "scheduling job retry"
        );
        let payload = serde_json::to_string(&job)?;
        let _: () = conn
            .zadd(Self::delayed_key(&handle.queue_name), payload, ready_at)
            .await
            .map_err(|e| HubError::QueueError {
                reason: format!("delayed schedule failed: {e}"),
            })?;
        Ok(())
    }
}
