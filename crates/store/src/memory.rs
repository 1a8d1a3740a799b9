//! In-memory `Storage` implementation: used by integration tests and local
//! development runs where standing up MongoDB isn't worth it.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use prhub_core::{
    DiffStats, HubResult, Installation, PrStatus, PullRequest, Repository, SummaryStatus, User,
};
use uuid::Uuid;

use crate::traits::{PrUpsert, Storage};

#[derive(Default)]
struct State {
    installations: HashMap<i64, Installation>,
    users: HashMap<String, User>,
    prs: HashMap<String, PullRequest>,
    /// (repo_id, number) -> pr id, the unique-key index backing idempotent
    /// upserts.
    pr_index: HashMap<(String, u64), String>,
}

pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStore {
    async fn health_check(&self) -> HubResult<()> {
        Ok(())
    }

    async fn get_installation(&self, installation_id: i64) -> HubResult<Option<Installation>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .installations
            .get(&installation_id)
            .cloned())
    }

    async fn upsert_installation(&self, installation: Installation) -> HubResult<bool> {
        let mut state = self.state.write().unwrap();
        if state.installations.contains_key(&installation.installation_id) {
            return Ok(false);
        }
        state
            .installations
            .insert(installation.installation_id, installation);
        Ok(true)
    }

    async fn mark_installation_suspended(&self, installation_id: i64) -> HubResult<()> {
        let mut state = self.state.write().unwrap();
        if let Some(installation) = state.installations.get_mut(&installation_id) {
            installation.suspended_at = Some(Utc::now());
        }
        for user in state.users.values_mut() {
            user.installation_ids.retain(|id| *id != installation_id);
        }
        Ok(())
    }

    async fn add_repositories(&self, installation_id: i64, repos: Vec<Repository>) -> HubResult<()> {
        let mut state = self.state.write().unwrap();
        if let Some(installation) = state.installations.get_mut(&installation_id) {
            for repo in repos {
                if !installation
                    .repositories
                    .iter()
                    .any(|r| r.repo_id == repo.repo_id)
                {
                    installation.repositories.push(repo);
                }
            }
        }
        Ok(())
    }

    async fn remove_repositories(&self, installation_id: i64, repo_ids: &[String]) -> HubResult<()> {
        let mut state = self.state.write().unwrap();
        if let Some(installation) = state.installations.get_mut(&installation_id) {
            installation
                .repositories
                .retain(|r| !repo_ids.contains(&r.repo_id));
        }
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> HubResult<Option<User>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_user_by_platform_id(&self, platform_id: i64) -> HubResult<Option<User>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .users
            .values()
            .find(|u| u.platform_id == platform_id)
            .cloned())
    }

    async fn find_users_by_installation(&self, installation_id: i64) -> HubResult<Vec<User>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .users
            .values()
            .filter(|u| u.installation_ids.contains(&installation_id))
            .cloned()
            .collect())
    }

    async fn save_user(&self, user: User) -> HubResult<()> {
        self.state.write().unwrap().users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn add_installation_to_user(&self, user_id: &str, installation_id: i64) -> HubResult<()> {
        let mut state = self.state.write().unwrap();
        if let Some(user) = state.users.get_mut(user_id) {
            if !user.installation_ids.contains(&installation_id) {
                user.installation_ids.push(installation_id);
            }
        }
        Ok(())
    }

    async fn remove_installation_from_all_users(&self, installation_id: i64) -> HubResult<()> {
        let mut state = self.state.write().unwrap();
        for user in state.users.values_mut() {
            user.installation_ids.retain(|id| *id != installation_id);
        }
        Ok(())
    }

    async fn get_pr(&self, id: &str) -> HubResult<Option<PullRequest>> {
        Ok(self.state.read().unwrap().prs.get(id).cloned())
    }

    async fn get_pr_by_repo_number(
        &self,
        repo_id: &str,
        number: u64,
    ) -> HubResult<Option<PullRequest>> {
        let state = self.state.read().unwrap();
        let key = (repo_id.to_string(), number);
        Ok(state
            .pr_index
            .get(&key)
            .and_then(|id| state.prs.get(id))
            .cloned())
    }

    async fn upsert_pr(&self, upsert: PrUpsert) -> HubResult<(PullRequest, bool)> {
        let mut state = self.state.write().unwrap();
        let key = (upsert.repo_id.clone(), upsert.number);
        let now = Utc::now();

        if let Some(id) = state.pr_index.get(&key).cloned() {
            let pr = state.prs.get_mut(&id).expect("index and map in sync");
            pr.title = upsert.title;
            pr.author = upsert.author;
            pr.branch_from = upsert.branch_from;
            pr.branch_to = upsert.branch_to;
            pr.status = upsert.status;
            pr.files_changed = upsert.files_changed;
            pr.repo_full_name = upsert.repo_full_name;
            pr.html_url = upsert.html_url;
            if upsert.user_id.is_some() {
                pr.user_id = upsert.user_id;
            }
            pr.updated_at = now;
            return Ok((pr.clone(), false));
        }

        let pr = PullRequest {
            id: Uuid::new_v4().to_string(),
            installation_id: upsert.installation_id,
            repo_id: upsert.repo_id.clone(),
            number: upsert.number,
            user_id: upsert.user_id,
            repo_full_name: upsert.repo_full_name,
            title: upsert.title,
            author: upsert.author,
            branch_from: upsert.branch_from,
            branch_to: upsert.branch_to,
            status: upsert.status,
            files_changed: upsert.files_changed,
            summary: None,
            summary_status: SummaryStatus::Pending,
            summary_error: None,
            last_summarized_at: None,
            system_labels: Vec::new(),
            risk_flags: Vec::new(),
            risk_score: 0,
            diff_stats: DiffStats::default(),
            chat_message_ts: None,
            html_url: upsert.html_url.clone(),
            created_at: now,
            updated_at: now,
        };
        state.prs.insert(pr.id.clone(), pr.clone());
        state.pr_index.insert(key, pr.id.clone());
        Ok((pr, true))
    }

    async fn save_pr(&self, pr: PullRequest) -> HubResult<()> {
        self.state.write().unwrap().prs.insert(pr.id.clone(), pr);
        Ok(())
    }

    async fn find_prs_by_user(
        &self,
        user: &User,
        limit: u64,
        skip: u64,
    ) -> HubResult<Vec<PullRequest>> {
        let state = self.state.read().unwrap();
        let mut matching: Vec<PullRequest> = state
            .prs
            .values()
            .filter(|pr| user.installation_ids.contains(&pr.installation_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_prs_by_installation_and_repo(
        &self,
        installation_id: i64,
        repo_id: &str,
    ) -> HubResult<u64> {
        let state = self.state.read().unwrap();
        Ok(state
            .prs
            .values()
            .filter(|pr| pr.installation_id == installation_id && pr.repo_id == repo_id)
            .count() as u64)
    }
}
