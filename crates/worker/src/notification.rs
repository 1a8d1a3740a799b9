//! Notification Worker (§4.F): consumes `pr-notify-chat` and delivers a
//! best-effort chat message.

use std::sync::Arc;

use prhub_chat::ChatNotifier;
use prhub_core::job::{Job, NotificationJobData};
use prhub_core::{HubError, HubResult};
use prhub_store::Storage;
use tracing::{info, warn};

use crate::outcome::JobOutcome;

pub struct NotificationWorker {
    pub store: Arc<dyn Storage>,
    pub chat: Arc<ChatNotifier>,
}

impl NotificationWorker {
    pub async fn process(&self, job: &Job) -> JobOutcome {
        JobOutcome::from_result(self.process_inner(job).await)
    }

    async fn process_inner(&self, job: &Job) -> HubResult<()> {
        let data: NotificationJobData = serde_json::from_value(job.data.clone())
            .map_err(|e| HubError::Internal {
                reason: format!("malformed notification job payload: {e}"),
            })?;

        match self.chat.send(&data).await {
            Ok(message_ts) => {
                info!(pull_request_id = %data.pull_request_id, "chat notification delivered");
                if let Some(mut pr) = self.store.get_pr(&data.pull_request_id).await? {
                    pr.chat_message_ts = Some(message_ts);
                    self.store.save_pr(pr).await?;
                }
            }
            Err(e) => {
                // Best-effort per §4.F step 4: never fails the job.
                warn!(pull_request_id = %data.pull_request_id, error = %e, "chat delivery failed");
            }
        }
        Ok(())
    }
}
