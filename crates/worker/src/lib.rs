//! Summary Worker and Notification Worker: the two queue-driven consumers
//! that turn an enqueued job into Durable Store mutations and, for
//! notifications, a best-effort chat delivery.

pub mod model;
pub mod notification;
pub mod outcome;
pub mod runner;
pub mod summary;

pub use model::{FileSummary, GenerativeModel, HttpGenerativeModel, SummaryRequest, SummaryResponse};
pub use notification::NotificationWorker;
pub use outcome::JobOutcome;
pub use runner::{run_worker_pool, JobProcessor};
pub use summary::SummaryWorker;

use async_trait::async_trait;
use prhub_core::job::Job;

#[async_trait]
impl JobProcessor for SummaryWorker {
    async fn process(&self, job: &Job) -> JobOutcome {
        SummaryWorker::process(self, job).await
    }
}

#[async_trait]
impl JobProcessor for NotificationWorker {
    async fn process(&self, job: &Job) -> JobOutcome {
        NotificationWorker::process(self, job).await
    }
}
