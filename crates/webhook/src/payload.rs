//! Platform webhook payload shapes, following `handlers::github`'s
//! `PullRequestEvent`/`PullRequest`/`Repository`/`GitHubUser` structs.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrUser {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestBody {
    pub number: u64,
    pub title: String,
    pub user: PrUser,
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub merged: bool,
    pub html_url: String,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryBody {
    pub id: u64,
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub pull_request: PullRequestBody,
    pub repository: RepositoryBody,
    pub installation: InstallationRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationRef {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationAccount {
    pub login: String,
    pub avatar_url: String,
    #[serde(rename = "type")]
    pub account_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationEvent {
    pub action: String,
    pub installation: InstallationEventBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationEventBody {
    pub id: i64,
    pub account: InstallationAccount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoRef {
    pub id: u64,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationRepositoriesEvent {
    pub action: String,
    pub installation: InstallationRef,
    #[serde(default)]
    pub repositories_added: Vec<RepoRef>,
    #[serde(default)]
    pub repositories_removed: Vec<RepoRef>,
}
