//! Best-effort chat delivery: POSTs the blocks payload and never escalates
//! failures into the queue's retry path (§4.F step 4, §9 "Best-effort chat").

use std::time::Duration;

use chrono::Utc;
use prhub_core::config::ChatConfig;
use prhub_core::job::NotificationJobData;
use tracing::{info, warn};

use crate::blocks::build_payload;
use crate::error::ChatError;

const CHAT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ChatNotifier {
    enabled: bool,
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl ChatNotifier {
    #[must_use]
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            enabled: config.enabled,
            webhook_url: config.webhook_url.clone(),
            client: reqwest::Client::builder()
                .timeout(CHAT_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
        }
    }

    /// Sends the notification. Returns the provider-supplied message id on
    /// success (synthesising a timestamp if the provider doesn't return
    /// one), so the caller can persist it as `chatMessageTs`. Every failure
    /// mode returns `Err` for the caller to log — callers MUST NOT retry or
    /// fail their outer job because of it.
    pub async fn send(&self, data: &NotificationJobData) -> Result<String, ChatError> {
        if !self.enabled {
            return Err(ChatError::NotConfigured);
        }
        let Some(webhook_url) = &self.webhook_url else {
            return Err(ChatError::NotConfigured);
        };

        let payload = build_payload(data);
        let response = self
            .client
            .post(webhook_url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 200 || body.trim() == "ok" {
            info!(
                pull_request_id = %data.pull_request_id,
                repo = %data.repo_full_name,
                number = data.number,
                "chat notification delivered"
            );
            return Ok(synthesise_message_ts());
        }

        warn!(
            pull_request_id = %data.pull_request_id,
            status = %status,
            body = %body,
            "chat notification delivery did not succeed"
        );
        Err(ChatError::NonSuccess {
            status: status.as_u16(),
            body,
        })
    }
}

fn synthesise_message_ts() -> String {
    Utc::now().timestamp_millis().to_string()
}
