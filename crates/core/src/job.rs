//! Job envelope shared between the queue and its workers. Jobs are not
//! persisted in the Durable Store; the queue backing store owns their
//! lifecycle.

use serde::{Deserialize, Serialize};

pub const QUEUE_PR_SUMMARY: &str = "pr-summary";
pub const QUEUE_PR_NOTIFY_CHAT: &str = "pr-notify-chat";

pub const JOB_NAME_GENERATE: &str = "generate";
pub const JOB_NAME_REGENERATE: &str = "regenerate";
pub const JOB_NAME_NOTIFICATION: &str = "pr-notification";

/// Payload for a `pr-summary` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryJobData {
    pub pull_request_id: String,
    pub installation_id: i64,
    pub repo_full_name: String,
    pub number: u64,
}

/// Payload for a `pr-notify-chat` job: a fully materialised notification,
/// self-contained so the Notification Worker never needs to re-query the
/// store before building the chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJobData {
    pub pull_request_id: String,
    pub repo_full_name: String,
    pub number: u64,
    pub title: String,
    pub author: String,
    pub tldr: String,
    pub risk_score: u8,
    pub main_risk_flags: Vec<String>,
    pub system_labels: Vec<String>,
    pub html_url: String,
    pub dashboard_url: Option<String>,
}

/// A job as seen by a worker: its queue/logical name, attempt count, and
/// opaque JSON data. Whether a job `name` other than `regenerate` is treated
/// as the default "skip-if-ready" variant is a worker-side decision (§4.C,
/// resolved open question), not something the envelope itself encodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub queue_name: String,
    pub name: String,
    pub data: serde_json::Value,
    pub attempts: u32,
    pub max_attempts: u32,
}

impl Job {
    #[must_use]
    pub fn new_summary(name: &str, data: SummaryJobData) -> Self {
        Self {
            queue_name: QUEUE_PR_SUMMARY.to_string(),
            name: name.to_string(),
            data: serde_json::to_value(data).expect("SummaryJobData always serializes"),
            attempts: 0,
            max_attempts: 3,
        }
    }

    #[must_use]
    pub fn new_notification(data: NotificationJobData) -> Self {
        Self {
            queue_name: QUEUE_PR_NOTIFY_CHAT.to_string(),
            name: JOB_NAME_NOTIFICATION.to_string(),
            data: serde_json::to_value(data).expect("NotificationJobData always serializes"),
            attempts: 0,
            max_attempts: 1,
        }
    }

    #[must_use]
    pub fn is_regenerate(&self) -> bool {
        self.name == JOB_NAME_REGENERATE
    }

    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_job_is_not_regenerate() {
        let job = Job::new_summary(
            JOB_NAME_GENERATE,
            SummaryJobData {
                pull_request_id: "1".into(),
                installation_id: 1,
                repo_full_name: "acme/widgets".into(),
                number: 7,
            },
        );
        assert!(!job.is_regenerate());
    }

    #[test]
    fn arbitrary_job_name_is_not_regenerate() {
        // Per the resolved open question: only the literal name "regenerate"
        // triggers the override; any other name (including the source's
        // historical "generate" queue-name confusion) is the default variant.
        let job = Job::new_summary(
            "generate",
            SummaryJobData {
                pull_request_id: "1".into(),
                installation_id: 1,
                repo_full_name: "acme/widgets".into(),
                number: 7,
            },
        );
        assert!(!job.is_regenerate());
    }

    #[test]
    fn regenerate_job_is_regenerate() {
        let job = Job::new_summary(
            JOB_NAME_REGENERATE,
            SummaryJobData {
                pull_request_id: "1".into(),
                installation_id: 1,
                repo_full_name: "acme/widgets".into(),
                number: 7,
            },
        );
        assert!(job.is_regenerate());
    }

    #[test]
    fn exhausted_after_max_attempts() {
        let mut job = Job::new_summary(
            JOB_NAME_GENERATE,
            SummaryJobData {
                pull_request_id: "1".into(),
                installation_id: 1,
                repo_full_name: "acme/widgets".into(),
                number: 7,
            },
        );
        job.attempts = 3;
        assert!(job.exhausted());
    }
}
