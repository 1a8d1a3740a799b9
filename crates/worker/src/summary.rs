//! Summary Worker (§4.E): fetches PR content, runs the deterministic
//! Analyzer, calls the generative model, and conditionally enqueues a chat
//! notification.

use std::sync::Arc;

use chrono::Utc;
use prhub_analyzer::analyze;
use prhub_broker::CredentialBroker;
use prhub_core::config::ChatConfig;
use prhub_core::errors::truncate_error_message;
use prhub_core::job::{Job, NotificationJobData, JOB_NAME_REGENERATE};
use prhub_core::model::{PrStatus, Summary, SummaryStatus};
use prhub_core::{HubError, HubResult};
use prhub_queue::JobQueue;
use prhub_store::Storage;
use tracing::{info, warn};

use crate::model::{FileSummary, GenerativeModel, SummaryRequest};
use crate::outcome::JobOutcome;

const MAX_FILE_SUMMARIES: usize = 20;
const MAX_PATCH_SNIPPETS: usize = 5;
const MAX_PATCH_LEN: usize = 1_000;

pub struct SummaryWorker {
    pub store: Arc<dyn Storage>,
    pub queue: Arc<dyn JobQueue>,
    pub broker: Arc<CredentialBroker>,
    pub model: Arc<dyn GenerativeModel>,
    pub chat: ChatConfig,
    /// `FRONTEND_BASE_URL`; used to build the optional `dashboardUrl` on
    /// notification payloads.
    pub frontend_base_url: String,
}

impl SummaryWorker {
    pub async fn process(&self, job: &Job) -> JobOutcome {
        JobOutcome::from_result(self.process_inner(job).await)
    }

    async fn process_inner(&self, job: &Job) -> HubResult<()> {
        let data: prhub_core::job::SummaryJobData = serde_json::from_value(job.data.clone())
            .map_err(|e| HubError::Internal {
                reason: format!("malformed summary job payload: {e}"),
            })?;

        // Step 1: load the PR.
        let mut pr = self
            .store
            .get_pr(&data.pull_request_id)
            .await?
            .ok_or_else(|| {
                warn!(pull_request_id = %data.pull_request_id, "PR vanished before summary job ran");
                HubError::NotFound {
                    reason: format!("pull request {} not found", data.pull_request_id),
                }
            })?;

        // Step 2-3: dedup against webhook double-enqueue.
        let was_ready = pr.summary_status == SummaryStatus::Ready;
        if was_ready && pr.summary.is_some() && job.name != JOB_NAME_REGENERATE {
            info!(
                pull_request_id = %data.pull_request_id,
                "summary already ready and job is not a regenerate; skipping"
            );
            return Ok(());
        }

        // Step 4: fetch PR metadata and files via the broker, in parallel.
        let Some((owner, repo)) = data.repo_full_name.split_once('/') else {
            return Err(HubError::Internal {
                reason: format!("malformed repo full name: {}", data.repo_full_name),
            });
        };
        let client = self.broker.installation_client(data.installation_id).await?;
        let (meta_result, files_result) = tokio::join!(
            client.get_pr(owner, repo, data.number),
            client.list_pr_files(owner, repo, data.number)
        );
        let meta = meta_result?;
        let files = files_result?;

        // Step 5: refresh state from the re-fetched metadata, then run the
        // pure Analyzer and persist even if the model call fails.
        pr.title = meta.title;
        pr.author = meta.user.login;
        pr.branch_from = meta.head.git_ref;
        pr.branch_to = meta.base.git_ref;
        pr.html_url = meta.html_url;
        pr.status = if meta.merged {
            PrStatus::Merged
        } else if meta.state.eq_ignore_ascii_case("closed") {
            PrStatus::Closed
        } else {
            PrStatus::Open
        };

        let analysis = analyze(&files);
        pr.files_changed = files.clone();
        pr.system_labels = analysis.system_labels.clone();
        pr.risk_flags = analysis.risk_flags.clone();
        pr.risk_score = analysis.risk_score;
        pr.diff_stats = analysis.diff_stats.clone();
        info!(
            pull_request_id = %data.pull_request_id,
            labels = ?pr.system_labels,
            risk_flags = ?pr.risk_flags,
            risk_score = pr.risk_score,
            "analyzer results computed"
        );

        // Step 6: call the generative model.
        let request = SummaryRequest {
            title: pr.title.clone(),
            author: pr.author.clone(),
            repo_full_name: pr.repo_full_name.clone(),
            file_summaries: files
                .iter()
                .take(MAX_FILE_SUMMARIES)
                .map(|f| FileSummary {
                    filename: f.filename.clone(),
                    additions: f.additions,
                    deletions: f.deletions,
                })
                .collect(),
            patch_snippets: files
                .iter()
                .filter(|f| !f.patch.is_empty())
                .take(MAX_PATCH_SNIPPETS)
                .map(|f| f.patch.chars().take(MAX_PATCH_LEN).collect())
                .collect(),
            system_labels: analysis.system_labels,
            risk_flags: analysis.risk_flags,
            risk_score: analysis.risk_score,
        };

        match self.model.generate_summary(&request).await {
            Ok(summary) => {
                pr.summary = Some(Summary {
                    tldr: summary.tldr,
                    risks: summary.risks,
                    labels: summary.labels,
                    created_at: Utc::now(),
                });
                pr.summary_status = SummaryStatus::Ready;
                pr.summary_error = None;
                pr.last_summarized_at = Some(Utc::now());
            }
            Err(e) => {
                warn!(pull_request_id = %data.pull_request_id, error = %e, "generative model call failed");
                pr.summary_status = SummaryStatus::Error;
                pr.summary_error = Some(truncate_error_message(&e.to_string()));
            }
        }
        pr.updated_at = Utc::now();
        self.store.save_pr(pr.clone()).await?;

        // Step 7: reload and decide whether to notify chat.
        let pr = self
            .store
            .get_pr(&data.pull_request_id)
            .await?
            .unwrap_or(pr);
        let became_ready_now = !was_ready && pr.summary_status == SummaryStatus::Ready;
        let high_risk = u32::from(pr.risk_score) >= u32::from(self.chat.risk_threshold);
        let secrets = pr.risk_flags.iter().any(|f| f == "secrets-suspected");
        let should_notify = self.chat.enabled && (became_ready_now || high_risk || secrets);

        if should_notify {
            let tldr = pr
                .summary
                .as_ref()
                .map(|s| s.tldr.clone())
                .unwrap_or_default();
            let job = Job::new_notification(NotificationJobData {
                pull_request_id: pr.id.clone(),
                repo_full_name: pr.repo_full_name.clone(),
                number: pr.number,
                title: pr.title.clone(),
                author: pr.author.clone(),
                tldr,
                risk_score: pr.risk_score,
                main_risk_flags: pr.risk_flags.clone(),
                system_labels: pr.system_labels.clone(),
                html_url: pr.html_url.clone(),
                dashboard_url: Some(format!("{}/prs/{}", self.frontend_base_url, pr.id)),
            });
            if let Err(e) = self.queue.enqueue(job).await {
                warn!(pull_request_id = %pr.id, error = %e, "failed to enqueue chat notification");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use prhub_broker::CredentialBroker;
    use prhub_core::config::PlatformConfig;
    use prhub_core::job::{SummaryJobData, JOB_NAME_GENERATE};
    use prhub_core::model::{FileChange, PrStatus, PullRequest};
    use prhub_queue::InMemoryQueue;
    use prhub_store::InMemoryStore;

    struct StubModel;

    #[async_trait]
    impl GenerativeModel for StubModel {
        async fn generate_summary(&self, _request: &SummaryRequest) -> HubResult<crate::model::SummaryResponse> {
            unreachable!("dedup path must not reach the model")
        }
    }

    fn invalid_key_broker() -> Arc<CredentialBroker> {
        Arc::new(
            CredentialBroker::from_config(&PlatformConfig {
                app_id: "123".to_string(),
                private_key_path: None,
                private_key: Some("not a real key".to_string()),
                webhook_secret: None,
                oauth_client_id: None,
                oauth_client_secret: None,
            })
            .unwrap(),
        )
    }

    fn base_pr(repo_id: &str, number: u64) -> PullRequest {
        let now = Utc::now();
        PullRequest {
            id: "pr-1".to_string(),
            installation_id: 1,
            repo_id: repo_id.to_string(),
            number,
            user_id: None,
            repo_full_name: "acme/widgets".to_string(),
            title: "Fix header parsing".to_string(),
            author: "alice".to_string(),
            branch_from: "fix/header".to_string(),
            branch_to: "main".to_string(),
            status: PrStatus::Open,
            files_changed: vec![FileChange {
                filename: "src/parser.ts".to_string(),
                additions: 10,
                deletions: 2,
                patch: String::new(),
            }],
            summary: Some(Summary {
                tldr: "existing summary".to_string(),
                risks: vec![],
                labels: vec![],
                created_at: now,
            }),
            summary_status: SummaryStatus::Ready,
            summary_error: None,
            last_summarized_at: Some(now),
            system_labels: vec![],
            risk_flags: vec![],
            risk_score: 0,
            diff_stats: Default::default(),
            chat_message_ts: None,
            html_url: "https://github.com/acme/widgets/pull/7".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn worker(store: Arc<dyn Storage>, queue: Arc<dyn JobQueue>) -> SummaryWorker {
        SummaryWorker {
            store,
            queue,
            broker: invalid_key_broker(),
            model: Arc::new(StubModel),
            chat: ChatConfig {
                enabled: false,
                webhook_url: None,
                risk_threshold: 60,
            },
            frontend_base_url: "http://localhost:3000".to_string(),
        }
    }

    #[tokio::test]
    async fn ready_summary_skips_reprocessing_for_non_regenerate_job() {
        let store: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryQueue::new());
        let pr = base_pr("12345", 7);
        store.save_pr(pr.clone()).await.unwrap();

        let w = worker(store.clone(), queue);
        let job = Job::new_summary(
            JOB_NAME_GENERATE,
            SummaryJobData {
                pull_request_id: pr.id.clone(),
                installation_id: 1,
                repo_full_name: pr.repo_full_name.clone(),
                number: pr.number,
            },
        );

        let outcome = w.process(&job).await;
        assert!(matches!(outcome, JobOutcome::Success));
    }

    #[tokio::test]
    async fn missing_pr_is_permanent_failure() {
        let store: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryQueue::new());
        let w = worker(store, queue);
        let job = Job::new_summary(
            JOB_NAME_GENERATE,
            SummaryJobData {
                pull_request_id: "does-not-exist".to_string(),
                installation_id: 1,
                repo_full_name: "acme/widgets".to_string(),
                number: 7,
            },
        );

        let outcome = w.process(&job).await;
        assert!(matches!(outcome, JobOutcome::Permanent(HubError::NotFound { .. })));
    }

    #[tokio::test]
    async fn invalid_signing_key_is_permanent_failure() {
        let store: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryQueue::new());
        let mut pr = base_pr("12345", 7);
        pr.summary_status = SummaryStatus::Pending;
        pr.summary = None;
        store.save_pr(pr.clone()).await.unwrap();

        let w = worker(store, queue);
        let job = Job::new_summary(
            JOB_NAME_GENERATE,
            SummaryJobData {
                pull_request_id: pr.id.clone(),
                installation_id: 1,
                repo_full_name: pr.repo_full_name.clone(),
                number: pr.number,
            },
        );

        let outcome = w.process(&job).await;
        assert!(matches!(outcome, JobOutcome::Permanent(HubError::ConfigMissing { .. })));
    }
}
