//! Generative-model client (§4.E step 6). The request/response shape
//! follows `AnthropicProvider`'s non-streaming request construction; the
//! trait itself mirrors `AIProvider`'s `is_configured`/`generate_text` split
//! so alternate providers can be swapped in without touching the worker.

use async_trait::async_trait;
use prhub_core::config::ModelConfig;
use prhub_core::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const MODEL_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MODEL_TIMEOUT: Duration = Duration::from_secs(45);

/// Everything the model needs to produce a summary: PR header fields, a
/// capped set of file summaries, a capped set of patch snippets, and the
/// deterministic analysis the model is instructed to treat as ground truth.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRequest {
    pub title: String,
    pub author: String,
    pub repo_full_name: String,
    pub file_summaries: Vec<FileSummary>,
    pub patch_snippets: Vec<String>,
    pub system_labels: Vec<String>,
    pub risk_flags: Vec<String>,
    pub risk_score: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub filename: String,
    pub additions: u32,
    pub deletions: u32,
}

/// Structured response the model is asked to produce.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SummaryResponse {
    pub tldr: String,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_summary(&self, request: &SummaryRequest) -> HubResult<SummaryResponse>;
}

#[derive(Serialize)]
struct ModelMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ModelRequest {
    model: String,
    messages: Vec<ModelMessage>,
    max_tokens: u32,
    system: String,
}

#[derive(Deserialize)]
struct ModelContent {
    text: String,
}

#[derive(Deserialize)]
struct ModelApiResponse {
    content: Vec<ModelContent>,
}

/// HTTP client for the configured generative model, built the way
/// `AnthropicProvider` builds its non-streaming request.
pub struct HttpGenerativeModel {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl HttpGenerativeModel {
    #[must_use]
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(MODEL_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    fn build_prompt(request: &SummaryRequest) -> String {
        let files: Vec<String> = request
            .file_summaries
            .iter()
            .map(|f| format!("- {} (+{}/-{})", f.filename, f.additions, f.deletions))
            .collect();

        format!(
            "PR: {}\nAuthor: {}\nRepo: {}\n\nFiles changed:\n{}\n\nPatch snippets:\n{}\n\nDeterministic analysis (ground truth, do not contradict):\nlabels={:?}\nriskFlags={:?}\nriskScore={}\n\nRespond with a single JSON object of shape {{\"tldr\": string, \"risks\": string[], \"labels\": string[]}} and nothing else.",
            request.title,
            request.author,
            request.repo_full_name,
            files.join("\n"),
            request.patch_snippets.join("\n---\n"),
            request.system_labels,
            request.risk_flags,
            request.risk_score,
        )
    }
}

#[async_trait]
impl GenerativeModel for HttpGenerativeModel {
    async fn generate_summary(&self, request: &SummaryRequest) -> HubResult<SummaryResponse> {
        let api_key = self.api_key.as_ref().ok_or_else(|| HubError::ModelFailure {
            reason: "GENMODEL_API_KEY not set".to_string(),
        })?;

        let body = ModelRequest {
            model: self.model.clone(),
            messages: vec![ModelMessage {
                role: "user",
                content: Self::build_prompt(request),
            }],
            max_tokens: 1024,
            system: "You are a terse pull-request summarizer. Always respond with exactly one JSON object, no prose, no markdown fences.".to_string(),
        };

        let response = self
            .client
            .post(MODEL_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| HubError::ModelFailure {
                reason: format!("model request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HubError::ModelFailure {
                reason: format!("model returned {status}: {body}"),
            });
        }

        let parsed: ModelApiResponse = response.json().await.map_err(|e| HubError::ModelFailure {
            reason: format!("failed to parse model response envelope: {e}"),
        })?;

        let text = parsed
            .content
            .first()
            .map(|c| c.text.as_str())
            .unwrap_or_default();

        let summary: SummaryResponse = serde_json::from_str(text.trim()).map_err(|e| {
            warn!(error = %e, raw = %text, "model response was not valid structured JSON");
            HubError::ModelFailure {
                reason: format!("model response was not valid JSON: {e}"),
            }
        })?;

        if summary.tldr.trim().is_empty() {
            return Err(HubError::ModelFailure {
                reason: "model returned an empty tldr".to_string(),
            });
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_prompt_includes_risk_score_and_flags() {
        let request = SummaryRequest {
            title: "Fix header parsing".to_string(),
            author: "alice".to_string(),
            repo_full_name: "acme/widgets".to_string(),
            file_summaries: vec![FileSummary {
                filename: "src/parser.ts".to_string(),
                additions: 10,
                deletions: 2,
            }],
            patch_snippets: vec![],
            system_labels: vec!["backend".to_string()],
            risk_flags: vec![],
            risk_score: 0,
        };
        let prompt = HttpGenerativeModel::build_prompt(&request);
        assert!(prompt.contains("riskScore=0"));
        assert!(prompt.contains("src/parser.ts"));
    }

    #[tokio::test]
    async fn missing_api_key_is_model_failure() {
        let client = HttpGenerativeModel::from_config(&ModelConfig {
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
        });
        let request = SummaryRequest {
            title: "t".to_string(),
            author: "a".to_string(),
            repo_full_name: "r".to_string(),
            file_summaries: vec![],
            patch_snippets: vec![],
            system_labels: vec![],
            risk_flags: vec![],
            risk_score: 0,
        };
        let result = client.generate_summary(&request).await;
        assert!(matches!(result, Err(HubError::ModelFailure { .. })));
    }
}
