//! The `Storage` trait: the Durable Store's CRUD surface plus the
//! specialised operations §4.B names.

use async_trait::async_trait;

use prhub_core::{FileChange, HubResult, Installation, PrStatus, PullRequest, Repository, User};

/// Parameters for `upsert_pr`. Identity fields (`installation_id`, `repo_id`,
/// `number`) double as the `$setOnInsert` data; everything else is the
/// `$set` patch applied whether the document is new or already exists.
#[derive(Debug, Clone)]
pub struct PrUpsert {
    pub installation_id: i64,
    pub repo_id: String,
    pub number: u64,
    pub repo_full_name: String,
    pub title: String,
    pub author: String,
    pub branch_from: String,
    pub branch_to: String,
    pub status: PrStatus,
    pub files_changed: Vec<FileChange>,
    pub user_id: Option<String>,
    pub html_url: String,
}

/// `Storage` is implemented once per backing store (Mongo in production, an
/// in-memory map for tests and local dev) and is otherwise the only thing
/// the rest of the hub knows about persistence.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Pings the backing store; used by `GET /health`.
    async fn health_check(&self) -> HubResult<()>;

    async fn get_installation(&self, installation_id: i64) -> HubResult<Option<Installation>>;

    /// Inserts the installation if it doesn't already exist (per §4.G,
    /// `installation.created` is a skip-if-exists upsert). Returns `true` if
    /// a new document was created.
    async fn upsert_installation(&self, installation: Installation) -> HubResult<bool>;

    async fn mark_installation_suspended(&self, installation_id: i64) -> HubResult<()>;

    async fn add_repositories(&self, installation_id: i64, repos: Vec<Repository>) -> HubResult<()>;

    async fn remove_repositories(&self, installation_id: i64, repo_ids: &[String]) -> HubResult<()>;

    async fn get_user_by_username(&self, username: &str) -> HubResult<Option<User>>;

    async fn get_user_by_platform_id(&self, platform_id: i64) -> HubResult<Option<User>>;

    /// Every user with `installation_id` in `installation_ids`. Backs PR
    /// author attribution's primary strategy: unique-member match.
    async fn find_users_by_installation(&self, installation_id: i64) -> HubResult<Vec<User>>;

    async fn save_user(&self, user: User) -> HubResult<()>;

    async fn add_installation_to_user(&self, user_id: &str, installation_id: i64) -> HubResult<()>;

    /// Used by `markInstallationSuspended`: removes `installation_id` from
    /// every user's `installation_ids`.
    async fn remove_installation_from_all_users(&self, installation_id: i64) -> HubResult<()>;

    async fn get_pr(&self, id: &str) -> HubResult<Option<PullRequest>>;

    async fn get_pr_by_repo_number(
        &self,
        repo_id: &str,
        number: u64,
    ) -> HubResult<Option<PullRequest>>;

    /// Atomic upsert by the unique key (`repo_id`, `number`). Returns the
    /// resulting document and a `created` flag.
    async fn upsert_pr(&self, upsert: PrUpsert) -> HubResult<(PullRequest, bool)>;

    async fn save_pr(&self, pr: PullRequest) -> HubResult<()>;

    /// Restricted to `installation_id ∈ user.installation_ids`, ordered by
    /// `created_at` desc.
    async fn find_prs_by_user(
        &self,
        user: &User,
        limit: u64,
        skip: u64,
    ) -> HubResult<Vec<PullRequest>>;

    async fn count_prs_by_installation_and_repo(
        &self,
        installation_id: i64,
        repo_id: &str,
    ) -> HubResult<u64>;
}
