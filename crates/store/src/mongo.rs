//! MongoDB-backed `Storage` implementation. Grounded on the CRUD-trait shape
//! of `tasks/src/storage/traits.rs`, adapted to the document store the spec
//! actually names (`MONGODB_URI`).

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::{doc, to_bson};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::{Client, Collection, Database};
use prhub_core::{HubError, HubResult, Installation, PullRequest, User};
use tracing::{debug, info};
use uuid::Uuid;

use crate::traits::{PrUpsert, Storage};

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connects to MongoDB at `uri` and selects the database named in the
    /// connection string (or `prhub` if none is present).
    ///
    /// # Errors
    ///
    /// Returns [`HubError::StorageError`] if the client cannot be
    /// constructed or the initial ping fails.
    pub async fn connect(uri: &str) -> HubResult<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| HubError::StorageError {
                reason: format!("failed to connect to MongoDB: {e}"),
            })?;
        let db = client.default_database().unwrap_or_else(|| client.database("prhub"));

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| HubError::StorageError {
                reason: format!("MongoDB ping failed: {e}"),
            })?;

        info!("connected to MongoDB");
        Ok(Self { db })
    }

    fn installations(&self) -> Collection<Installation> {
        self.db.collection("installations")
    }

    fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    fn pull_requests(&self) -> Collection<PullRequest> {
        self.db.collection("pull_requests")
    }

    fn storage_err(context: &str, err: impl std::fmt::Display) -> HubError {
        HubError::StorageError {
            reason: format!("{context}: {err}"),
        }
    }
}

#[async_trait]
impl Storage for MongoStore {
    async fn health_check(&self) -> HubResult<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Self::storage_err("ping failed", e))?;
        Ok(())
    }

    async fn get_installation(&self, installation_id: i64) -> HubResult<Option<Installation>> {
        self.installations()
            .find_one(doc! { "installationId": installation_id })
            .await
            .map_err(|e| Self::storage_err("get_installation", e))
    }

    async fn upsert_installation(&self, installation: Installation) -> HubResult<bool> {
        let existing = self.get_installation(installation.installation_id).await?;
        if existing.is_some() {
            return Ok(false);
        }
        self.installations()
            .insert_one(&installation)
            .await
            .map_err(|e| Self::storage_err("upsert_installation", e))?;
        Ok(true)
    }

    async fn mark_installation_suspended(&self, installation_id: i64) -> HubResult<()> {
        self.installations()
            .update_one(
                doc! { "installationId": installation_id },
                doc! { "$set": { "suspendedAt": to_bson(&Utc::now()).unwrap() } },
            )
            .await
            .map_err(|e| Self::storage_err("mark_installation_suspended", e))?;
        self.remove_installation_from_all_users(installation_id).await
    }

    async fn add_repositories(
        &self,
        installation_id: i64,
        repos: Vec<prhub_core::Repository>,
    ) -> HubResult<()> {
        if repos.is_empty() {
            return Ok(());
        }
        let bson_repos: Vec<_> = repos
            .iter()
            .map(|r| to_bson(r).expect("Repository serializes"))
            .collect();
        self.installations()
            .update_one(
                doc! { "installationId": installation_id },
                doc! { "$addToSet": { "repositories": { "$each": bson_repos } } },
            )
            .await
            .map_err(|e| Self::storage_err("add_repositories", e))?;
        Ok(())
    }

    async fn remove_repositories(
        &self,
        installation_id: i64,
        repo_ids: &[String],
    ) -> HubResult<()> {
        self.installations()
            .update_one(
                doc! { "installationId": installation_id },
                doc! { "$pull": { "repositories": { "repoId": { "$in": repo_ids } } } },
            )
            .await
            .map_err(|e| Self::storage_err("remove_repositories", e))?;
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> HubResult<Option<User>> {
        self.users()
            .find_one(doc! { "username": username })
            .await
            .map_err(|e| Self::storage_err("get_user_by_username", e))
    }

    async fn get_user_by_platform_id(&self, platform_id: i64) -> HubResult<Option<User>> {
        self.users()
            .find_one(doc! { "platformId": platform_id })
            .await
            .map_err(|e| Self::storage_err("get_user_by_platform_id", e))
    }

    async fn find_users_by_installation(&self, installation_id: i64) -> HubResult<Vec<User>> {
        use futures::stream::TryStreamExt;

        let cursor = self
            .users()
            .find(doc! { "installationIds": installation_id })
            .await
            .map_err(|e| Self::storage_err("find_users_by_installation", e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| Self::storage_err("find_users_by_installation collect", e))
    }

    async fn save_user(&self, user: User) -> HubResult<()> {
        self.users()
            .replace_one(doc! { "id": &user.id }, &user)
            .upsert(true)
            .await
            .map_err(|e| Self::storage_err("save_user", e))?;
        Ok(())
    }

    async fn add_installation_to_user(&self, user_id: &str, installation_id: i64) -> HubResult<()> {
        self.users()
            .update_one(
                doc! { "id": user_id },
                doc! { "$addToSet": { "installationIds": installation_id } },
            )
            .await
            .map_err(|e| Self::storage_err("add_installation_to_user", e))?;
        Ok(())
    }

    async fn remove_installation_from_all_users(&self, installation_id: i64) -> HubResult<()> {
        self.users()
            .update_many(
                doc! {},
                doc! { "$pull": { "installationIds": installation_id } },
            )
            .await
            .map_err(|e| Self::storage_err("remove_installation_from_all_users", e))?;
        Ok(())
    }

    async fn get_pr(&self, id: &str) -> HubResult<Option<PullRequest>> {
        self.pull_requests()
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| Self::storage_err("get_pr", e))
    }

    async fn get_pr_by_repo_number(
        &self,
        repo_id: &str,
        number: u64,
    ) -> HubResult<Option<PullRequest>> {
        self.pull_requests()
            .find_one(doc! { "repoId": repo_id, "number": number as i64 })
            .await
            .map_err(|e| Self::storage_err("get_pr_by_repo_number", e))
    }

    async fn upsert_pr(&self, upsert: PrUpsert) -> HubResult<(PullRequest, bool)> {
        let filter = doc! { "repoId": &upsert.repo_id, "number": upsert.number as i64 };

        let mut set_doc = doc! {
            "repoFullName": &upsert.repo_full_name,
            "title": &upsert.title,
            "author": &upsert.author,
            "branchFrom": &upsert.branch_from,
            "branchTo": &upsert.branch_to,
            "status": to_bson(&upsert.status).unwrap(),
            "filesChanged": to_bson(&upsert.files_changed).unwrap(),
            "htmlUrl": &upsert.html_url,
            "updatedAt": to_bson(&Utc::now()).unwrap(),
        };
        if let Some(user_id) = &upsert.user_id {
            set_doc.insert("userId", user_id);
        }

        let now = Utc::now();
        let set_on_insert = doc! {
            "id": Uuid::new_v4().to_string(),
            "installationId": upsert.installation_id,
            "summary": mongodb::bson::Bson::Null,
            "summaryStatus": "pending",
            "summaryError": mongodb::bson::Bson::Null,
            "lastSummarizedAt": mongodb::bson::Bson::Null,
            "systemLabels": Vec::<String>::new(),
            "riskFlags": Vec::<String>::new(),
            "riskScore": 0i32,
            "diffStats": to_bson(&prhub_core::DiffStats::default()).unwrap(),
            "chatMessageTs": mongodb::bson::Bson::Null,
            "createdAt": to_bson(&now).unwrap(),
        };

        let update = doc! { "$set": set_doc, "$setOnInsert": set_on_insert };

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let existed = self.get_pr_by_repo_number(&upsert.repo_id, upsert.number).await?.is_some();

        let pr = self
            .pull_requests()
            .find_one_and_update(filter, update)
            .with_options(options)
            .await
            .map_err(|e| Self::storage_err("upsert_pr", e))?
            .ok_or_else(|| HubError::Internal {
                reason: "upsert_pr returned no document".to_string(),
            })?;

        debug!(repo_id = %upsert.repo_id, number = upsert.number, created = !existed, "upserted PR");
        Ok((pr, !existed))
    }

    async fn save_pr(&self, pr: PullRequest) -> HubResult<()> {
        self.pull_requests()
            .replace_one(doc! { "id": &pr.id }, &pr)
            .upsert(true)
            .await
            .map_err(|e| Self::storage_err("save_pr", e))?;
        Ok(())
    }

    async fn find_prs_by_user(
        &self,
        user: &User,
        limit: u64,
        skip: u64,
    ) -> HubResult<Vec<PullRequest>> {
        use futures::stream::TryStreamExt;

        let filter = doc! { "installationId": { "$in": &user.installation_ids } };
        let options = mongodb::options::FindOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .limit(limit as i64)
            .skip(skip)
            .build();

        let cursor = self
            .pull_requests()
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| Self::storage_err("find_prs_by_user", e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| Self::storage_err("find_prs_by_user collect", e))
    }

    async fn count_prs_by_installation_and_repo(
        &self,
        installation_id: i64,
        repo_id: &str,
    ) -> HubResult<u64> {
        self.pull_requests()
            .count_documents(doc! { "installationId": installation_id, "repoId": repo_id })
            .await
            .map_err(|e| Self::storage_err("count_prs_by_installation_and_repo", e))
    }
}
