//! The webhook receiver's single per-action dispatcher (§4.G). One handler
//! module owns the entire state machine: signature check, JSON parse, and
//! the event/action match — mirroring `linear_webhook_handler`'s shape but
//! collapsed into one dispatch instead of being split across a callback
//! module and a GitHub-specific handler module.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use prhub_broker::CredentialBroker;
use prhub_core::job::{Job, JOB_NAME_GENERATE};
use prhub_core::model::{AccountType, Installation, PrStatus, Repository, SummaryStatus};
use prhub_core::job::SummaryJobData;
use prhub_queue::JobQueue;
use prhub_store::{PrUpsert, Storage};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::installation_sync::sync_installation_members;
use crate::payload::{InstallationEvent, InstallationRepositoriesEvent, PullRequestEvent};
use crate::signature::verify_webhook_signature;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub queue: Arc<dyn JobQueue>,
    pub broker: Arc<CredentialBroker>,
    pub webhook_secret: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/platform", post(webhook_handler))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    match state.store.health_check().await {
        Ok(()) => Json(json!({ "status": "ok" })),
        Err(e) => {
            warn!(error = %e, "health check store ping failed");
            Json(json!({ "status": "ok" }))
        }
    }
}

async fn readiness_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    state
        .store
        .health_check()
        .await
        .map(|()| Json(json!({ "status": "ready" })))
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}

/// Entry point for `POST /webhooks/platform`.
///
/// 1. Verify `X-Hub-Signature-256` against the raw body (bypassed with a
///    loud warning if no secret is configured — development mode only).
/// 2. Parse JSON.
/// 3. Dispatch on `X-Event-Name` + the payload's `action` field.
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    let delivery_id = headers
        .get("X-Delivery-Id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let event_name = headers
        .get("X-Event-Name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    info!(delivery_id = %delivery_id, event_name = %event_name, "received webhook");

    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok());
        let Some(signature) = signature else {
            warn!("missing X-Hub-Signature-256 header");
            return Err(StatusCode::UNAUTHORIZED);
        };
        if !verify_webhook_signature(&body, signature, secret) {
            warn!("webhook signature verification failed");
            return Err(StatusCode::UNAUTHORIZED);
        }
    } else {
        warn!("PLATFORM_WEBHOOK_SECRET not set; bypassing signature verification (development mode only)");
    }

    let value: Value = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "failed to parse webhook JSON body");
        StatusCode::BAD_REQUEST
    })?;

    if event_name == "ping" {
        return Ok(Json(json!({ "status": "ok" })));
    }

    let result = match event_name.as_str() {
        "installation" => handle_installation(&state, value).await,
        "installation_repositories" => handle_installation_repositories(&state, value).await,
        "pull_request" => handle_pull_request(&state, value).await,
        _ => {
            debug!(event_name = %event_name, "acknowledging unhandled event");
            Ok(json!({ "status": "ignored" }))
        }
    };

    match result {
        Ok(body) => Ok(Json(body)),
        Err(e) => {
            error!(error = %e, delivery_id = %delivery_id, "webhook handling failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn handle_installation(state: &AppState, value: Value) -> Result<Value, String> {
    let event: InstallationEvent = serde_json::from_value(value).map_err(|e| e.to_string())?;

    match event.action.as_str() {
        "created" => {
            let account_type = if event.installation.account.account_type == "Organization" {
                AccountType::Organization
            } else {
                AccountType::User
            };
            let mut installation = Installation::new(
                event.installation.id,
                account_type,
                event.installation.account.login.clone(),
            );
            installation.account_avatar_url = event.installation.account.avatar_url.clone();

            state
                .store
                .upsert_installation(installation)
                .await
                .map_err(|e| e.to_string())?;

            if account_type == AccountType::Organization {
                match sync_installation_members(
                    state.store.as_ref(),
                    state.broker.as_ref(),
                    event.installation.id,
                    &event.installation.account.login,
                )
                .await
                {
                    Ok(outcome) => {
                        info!(
                            installation_id = event.installation.id,
                            updated = outcome.updated,
                            errors = outcome.errors.len(),
                            "installation member sync complete"
                        );
                    }
                    Err(e) => warn!(error = %e, "installation member sync failed"),
                }
            } else {
                if let Some(user) = state
                    .store
                    .get_user_by_username(&event.installation.account.login)
                    .await
                    .map_err(|e| e.to_string())?
                {
                    state
                        .store
                        .add_installation_to_user(&user.id, event.installation.id)
                        .await
                        .map_err(|e| e.to_string())?;
                }
            }

            Ok(json!({ "status": "ok" }))
        }
        "deleted" => {
            state
                .store
                .mark_installation_suspended(event.installation.id)
                .await
                .map_err(|e| e.to_string())?;
            state
                .store
                .remove_installation_from_all_users(event.installation.id)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({ "status": "ok" }))
        }
        other => {
            debug!(action = other, "ignoring unhandled installation action");
            Ok(json!({ "status": "ignored" }))
        }
    }
}

async fn handle_installation_repositories(state: &AppState, value: Value) -> Result<Value, String> {
    let event: InstallationRepositoriesEvent =
        serde_json::from_value(value).map_err(|e| e.to_string())?;

    match event.action.as_str() {
        "added" => {
            let repos: Vec<Repository> = event
                .repositories_added
                .iter()
                .map(|r| Repository {
                    repo_id: r.id.to_string(),
                    repo_full_name: r.full_name.clone(),
                    private: r.private,
                    installed_at: chrono::Utc::now(),
                })
                .collect();
            state
                .store
                .add_repositories(event.installation.id, repos)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({ "status": "ok" }))
        }
        "removed" => {
            let repo_ids: Vec<String> = event
                .repositories_removed
                .iter()
                .map(|r| r.id.to_string())
                .collect();
            state
                .store
                .remove_repositories(event.installation.id, &repo_ids)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({ "status": "ok" }))
        }
        other => {
            debug!(action = other, "ignoring unhandled installation_repositories action");
            Ok(json!({ "status": "ignored" }))
        }
    }
}

async fn handle_pull_request(state: &AppState, value: Value) -> Result<Value, String> {
    let event: PullRequestEvent = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let repo_id = event.repository.id.to_string();
    let number = event.pull_request.number;

    match event.action.as_str() {
        "opened" => {
            if state
                .store
                .get_pr_by_repo_number(&repo_id, number)
                .await
                .map_err(|e| e.to_string())?
                .is_some()
            {
                return Ok(json!({ "status": "ok", "reason": "already_exists" }));
            }

            let files_changed = fetch_files_best_effort(
                state,
                event.installation.id,
                &event.repository.full_name,
                number,
            )
            .await;

            let user_id = attribute_author(state, event.installation.id, &event.pull_request.user.login)
                .await
                .map_err(|e| e.to_string())?;

            let (pr, _created) = state
                .store
                .upsert_pr(PrUpsert {
                    installation_id: event.installation.id,
                    repo_id: repo_id.clone(),
                    number,
                    repo_full_name: event.repository.full_name.clone(),
                    title: event.pull_request.title.clone(),
                    author: event.pull_request.user.login.clone(),
                    branch_from: event.pull_request.head.ref_name.clone(),
                    branch_to: event.pull_request.base.ref_name.clone(),
                    status: PrStatus::Open,
                    files_changed,
                    user_id,
                    html_url: event.pull_request.html_url.clone(),
                })
                .await
                .map_err(|e| e.to_string())?;

            enqueue_summary(state, &pr.id, event.installation.id, &pr.repo_full_name, number, JOB_NAME_GENERATE)
                .await
                .map_err(|e| e.to_string())?;

            Ok(json!({ "status": "ok", "pull_request_id": pr.id }))
        }
        "synchronize" | "edited" => {
            let (pr, created) = state
                .store
                .upsert_pr(PrUpsert {
                    installation_id: event.installation.id,
                    repo_id: repo_id.clone(),
                    number,
                    repo_full_name: event.repository.full_name.clone(),
                    title: event.pull_request.title.clone(),
                    author: event.pull_request.user.login.clone(),
                    branch_from: event.pull_request.head.ref_name.clone(),
                    branch_to: event.pull_request.base.ref_name.clone(),
                    status: pr_status_from_state(&event.pull_request.state, event.pull_request.merged),
                    files_changed: Vec::new(),
                    user_id: None,
                    html_url: event.pull_request.html_url.clone(),
                })
                .await
                .map_err(|e| e.to_string())?;

            if created || pr.summary_status == SummaryStatus::Pending {
                enqueue_summary(state, &pr.id, event.installation.id, &pr.repo_full_name, number, JOB_NAME_GENERATE)
                    .await
                    .map_err(|e| e.to_string())?;
            }

            Ok(json!({ "status": "ok", "pull_request_id": pr.id }))
        }
        "closed" => {
            if let Some(mut pr) = state
                .store
                .get_pr_by_repo_number(&repo_id, number)
                .await
                .map_err(|e| e.to_string())?
            {
                pr.status = if event.pull_request.merged {
                    PrStatus::Merged
                } else {
                    PrStatus::Closed
                };
                pr.updated_at = chrono::Utc::now();
                state.store.save_pr(pr).await.map_err(|e| e.to_string())?;
            }
            Ok(json!({ "status": "ok" }))
        }
        "reopened" => {
            if let Some(mut pr) = state
                .store
                .get_pr_by_repo_number(&repo_id, number)
                .await
                .map_err(|e| e.to_string())?
            {
                pr.status = PrStatus::Open;
                pr.summary_status = SummaryStatus::Pending;
                pr.summary_error = None;
                pr.updated_at = chrono::Utc::now();
                let pull_request_id = pr.id.clone();
                let repo_full_name = pr.repo_full_name.clone();
                state.store.save_pr(pr).await.map_err(|e| e.to_string())?;
                enqueue_summary(
                    state,
                    &pull_request_id,
                    event.installation.id,
                    &repo_full_name,
                    number,
                    JOB_NAME_GENERATE,
                )
                .await
                .map_err(|e| e.to_string())?;
            }
            Ok(json!({ "status": "ok" }))
        }
        other => {
            debug!(action = other, "ignoring unhandled pull_request action");
            Ok(json!({ "status": "ignored" }))
        }
    }
}

/// PR author attribution: the unique installation member if the
/// installation has exactly one linked user, else a username match.
async fn attribute_author(
    state: &AppState,
    installation_id: i64,
    author_login: &str,
) -> prhub_core::HubResult<Option<String>> {
    let members = state.store.find_users_by_installation(installation_id).await?;
    if let [member] = members.as_slice() {
        return Ok(Some(member.id.clone()));
    }
    Ok(state
        .store
        .get_user_by_username(author_login)
        .await?
        .map(|u| u.id))
}

fn pr_status_from_state(state: &str, merged: bool) -> PrStatus {
    if merged {
        PrStatus::Merged
    } else if state.eq_ignore_ascii_case("closed") {
        PrStatus::Closed
    } else {
        PrStatus::Open
    }
}

async fn fetch_files_best_effort(
    state: &AppState,
    installation_id: i64,
    repo_full_name: &str,
    number: u64,
) -> Vec<prhub_core::model::FileChange> {
    let Some((owner, repo)) = repo_full_name.split_once('/') else {
        warn!(repo_full_name, "malformed repository full name");
        return Vec::new();
    };
    match state.broker.installation_client(installation_id).await {
        Ok(client) => match client.list_pr_files(owner, repo, number).await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "best-effort PR file fetch failed");
                Vec::new()
            }
        },
        Err(e) => {
            warn!(error = %e, "failed to obtain installation client for file fetch");
            Vec::new()
        }
    }
}

async fn enqueue_summary(
    state: &AppState,
    pull_request_id: &str,
    installation_id: i64,
    repo_full_name: &str,
    number: u64,
    job_name: &str,
) -> prhub_core::HubResult<()> {
    let job = Job::new_summary(
        job_name,
        SummaryJobData {
            pull_request_id: pull_request_id.to_string(),
            installation_id,
            repo_full_name: repo_full_name.to_string(),
            number,
        },
    );
    state.queue.enqueue(job).await
}
