//! Installation-scoped GitHub REST client. Header setup and idempotent-GET
//! retry follow `github_client.rs`'s conventions.

use std::time::Duration;

use prhub_core::{FileChange, HubError, HubResult};
use prhub_queue::RetryPolicy;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

const GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct PrMeta {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
    pub merged: bool,
    pub user: GithubUser,
    pub head: GitRef,
    pub base: GitRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub git_ref: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrFile {
    pub filename: String,
    pub additions: u32,
    pub deletions: u32,
    #[serde(default)]
    pub patch: Option<String>,
}

impl From<PrFile> for FileChange {
    fn from(f: PrFile) -> Self {
        FileChange {
            filename: f.filename,
            additions: f.additions,
            deletions: f.deletions,
            patch: f.patch.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoSummary {
    pub id: u64,
    pub full_name: String,
    pub private: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ReposResponse {
    repositories: Vec<RepoSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrgMember {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationAccount {
    #[serde(rename = "type")]
    pub account_type: String,
    pub login: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationMeta {
    pub id: i64,
    pub account: InstallationAccount,
}

/// Thin wrapper over the GitHub REST surface the hub needs, authenticated
/// with a single installation token.
#[derive(Clone)]
pub struct InstallationClient {
    http: reqwest::Client,
    token: String,
    retry_policy: RetryPolicy,
}

impl InstallationClient {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
            token,
            retry_policy: RetryPolicy::default(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("prhub/1.0"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.token))
                .expect("bearer token is valid header value"),
        );
        headers
    }

    /// Retries an idempotent GET on 5xx responses with capped exponential
    /// backoff (≤3 attempts per §4.A.3).
    async fn get_with_retry(&self, url: &str) -> HubResult<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = self
                .http
                .get(url)
                .headers(self.headers())
                .send()
                .await
                .map_err(|e| HubError::UpstreamTransient {
                    reason: format!("GET {url} failed: {e}"),
                })?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if status.is_client_error() {
                return Err(HubError::UpstreamPermanent {
                    status: status.as_u16(),
                    reason: format!("GET {url} returned {status}"),
                });
            }
            if attempt >= self.retry_policy.max_attempts {
                return Err(HubError::UpstreamTransient {
                    reason: format!("GET {url} returned {status} after {attempt} attempts"),
                });
            }
            let delay = self.retry_policy.backoff_for(attempt);
            warn!(url = %url, status = %status, attempt, "retrying GitHub GET after transient failure");
            tokio::time::sleep(delay).await;
        }
    }

    /// # Errors
    ///
    /// Returns [`HubError::UpstreamPermanent`] on 4xx, [`HubError::UpstreamTransient`]
    /// if retries are exhausted.
    pub async fn get_pr(&self, owner: &str, repo: &str, number: u64) -> HubResult<PrMeta> {
        let url = format!("{GITHUB_API_URL}/repos/{owner}/{repo}/pulls/{number}");
        debug!(owner, repo, number, "fetching PR metadata");
        self.get_with_retry(&url)
            .await?
            .json()
            .await
            .map_err(|e| HubError::Internal {
                reason: format!("failed to parse PR response: {e}"),
            })
    }

    /// Up to 100 files per §4.E step 4; GitHub paginates at 30/page by
    /// default so we request the max page size explicitly.
    pub async fn list_pr_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> HubResult<Vec<FileChange>> {
        let url =
            format!("{GITHUB_API_URL}/repos/{owner}/{repo}/pulls/{number}/files?per_page=100");
        let files: Vec<PrFile> = self
            .get_with_retry(&url)
            .await?
            .json()
            .await
            .map_err(|e| HubError::Internal {
                reason: format!("failed to parse PR files response: {e}"),
            })?;
        Ok(files.into_iter().map(Into::into).collect())
    }

    pub async fn list_repos_accessible_to_installation(&self) -> HubResult<Vec<RepoSummary>> {
        let url = format!("{GITHUB_API_URL}/installation/repositories?per_page=100");
        let parsed: ReposResponse = self
            .get_with_retry(&url)
            .await?
            .json()
            .await
            .map_err(|e| HubError::Internal {
                reason: format!("failed to parse repositories response: {e}"),
            })?;
        Ok(parsed.repositories)
    }

    /// Pages `GET /orgs/{org}/members`, falling back to
    /// `/orgs/{org}/public_members` if the call is forbidden (private
    /// membership visibility) per §4.H.
    pub async fn list_org_members(&self, org: &str) -> HubResult<Vec<OrgMember>> {
        let url = format!("{GITHUB_API_URL}/orgs/{org}/members?per_page=100");
        match self.get_with_retry(&url).await {
            Ok(response) => response.json().await.map_err(|e| HubError::Internal {
                reason: format!("failed to parse org members response: {e}"),
            }),
            Err(HubError::UpstreamPermanent { status: 403, .. }) => {
                warn!(org, "org members forbidden, falling back to public members");
                let fallback_url = format!("{GITHUB_API_URL}/orgs/{org}/public_members?per_page=100");
                self.get_with_retry(&fallback_url)
                    .await?
                    .json()
                    .await
                    .map_err(|e| HubError::Internal {
                        reason: format!("failed to parse public members response: {e}"),
                    })
            }
            Err(other) => Err(other),
        }
    }

    pub async fn get_installation(&self) -> HubResult<InstallationMeta> {
        let url = format!("{GITHUB_API_URL}/app/installations");
        self.get_with_retry(&url)
            .await?
            .json()
            .await
            .map_err(|e| HubError::Internal {
                reason: format!("failed to parse installation response: {e}"),
            })
    }
}
