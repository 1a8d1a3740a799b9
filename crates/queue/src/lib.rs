//! At-least-once job queue with retry/backoff and dead-letter retention.

pub mod backoff;
pub mod memory;
pub mod redis;
pub mod traits;

pub use backoff::RetryPolicy;
pub use memory::InMemoryQueue;
pub use redis::RedisQueue;
pub use traits::{Dequeued, JobHandle, JobQueue};
