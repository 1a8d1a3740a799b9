//! Domain entities: Installation, User, PullRequest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    User,
    Organization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub repo_id: String,
    pub repo_full_name: String,
    pub private: bool,
    pub installed_at: DateTime<Utc>,
}

/// A tenancy grant by the upstream platform, scoped to a set of repositories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installation {
    pub installation_id: i64,
    pub account_type: AccountType,
    pub account_login: String,
    pub account_avatar_url: String,
    pub repositories: Vec<Repository>,
    pub suspended_at: Option<DateTime<Utc>>,
}

impl Installation {
    #[must_use]
    pub fn new(installation_id: i64, account_type: AccountType, account_login: String) -> Self {
        Self {
            installation_id,
            account_type,
            account_login,
            account_avatar_url: String::new(),
            repositories: Vec::new(),
            suspended_at: None,
        }
    }

    #[must_use]
    pub fn is_organization(&self) -> bool {
        matches!(self.account_type, AccountType::Organization)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Viewer,
}

/// An authenticated human, linked to zero or more Installations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub platform_id: i64,
    pub username: String,
    pub email: String,
    pub avatar_url: String,
    pub installation_ids: Vec<i64>,
    pub role: UserRole,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    #[must_use]
    pub fn has_installation(&self, installation_id: i64) -> bool {
        self.installation_ids.contains(&installation_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrStatus {
    Open,
    Closed,
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Pending,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub filename: String,
    pub additions: u32,
    pub deletions: u32,
    /// Unified diff text for this file, when available. Empty when the
    /// platform didn't return a patch (e.g. binary files, or a best-effort
    /// fetch that failed).
    #[serde(default)]
    pub patch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub tldr: String,
    pub risks: Vec<String>,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub total_additions: u32,
    pub total_deletions: u32,
    pub changed_files_count: u32,
}

/// The primary domain entity: a pull request enriched with deterministic
/// analysis and, eventually, a generative-model summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: String,
    pub installation_id: i64,
    pub repo_id: String,
    pub number: u64,
    pub user_id: Option<String>,
    pub repo_full_name: String,
    pub title: String,
    pub author: String,
    pub branch_from: String,
    pub branch_to: String,
    pub status: PrStatus,
    pub files_changed: Vec<FileChange>,
    pub summary: Option<Summary>,
    pub summary_status: SummaryStatus,
    pub summary_error: Option<String>,
    pub last_summarized_at: Option<DateTime<Utc>>,
    pub system_labels: Vec<String>,
    pub risk_flags: Vec<String>,
    pub risk_score: u8,
    pub diff_stats: DiffStats,
    pub chat_message_ts: Option<String>,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PullRequest {
    /// Invariant check used by tests and defensively at write time:
    /// `riskScore` in range, and the summary/summaryError <-> summaryStatus
    /// implications from §3/§8 hold.
    #[must_use]
    pub fn upholds_invariants(&self) -> bool {
        if self.risk_score > 100 {
            return false;
        }
        if self.summary_status == SummaryStatus::Ready && self.summary.is_none() {
            return false;
        }
        if self.summary_error.is_some() && self.summary_status != SummaryStatus::Error {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_pr() -> PullRequest {
        PullRequest {
            id: "1".into(),
            installation_id: 1,
            repo_id: "12345".into(),
            number: 7,
            user_id: None,
            repo_full_name: "acme/widgets".into(),
            title: "Fix header parsing".into(),
            author: "alice".into(),
            branch_from: "fix/header".into(),
            branch_to: "main".into(),
            status: PrStatus::Open,
            files_changed: vec![],
            summary: None,
            summary_status: SummaryStatus::Pending,
            summary_error: None,
            last_summarized_at: None,
            system_labels: vec![],
            risk_flags: vec![],
            risk_score: 0,
            diff_stats: DiffStats::default(),
            chat_message_ts: None,
            html_url: "https://github.com/acme/widgets/pull/7".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn pending_pr_upholds_invariants() {
        assert!(base_pr().upholds_invariants());
    }

    #[test]
    fn ready_without_summary_violates_invariant() {
        let mut pr = base_pr();
        pr.summary_status = SummaryStatus::Ready;
        assert!(!pr.upholds_invariants());
    }

    #[test]
    fn summary_error_requires_error_status() {
        let mut pr = base_pr();
        pr.summary_error = Some("boom".into());
        assert!(!pr.upholds_invariants());
    }

    #[test]
    fn risk_score_above_100_violates_invariant() {
        let mut pr = base_pr();
        pr.risk_score = 101;
        assert!(!pr.upholds_invariants());
    }
}
