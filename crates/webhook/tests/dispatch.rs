//! End-to-end dispatch tests against the router (S5, S6 seed scenarios).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use prhub_broker::CredentialBroker;
use prhub_core::config::PlatformConfig;
use prhub_queue::InMemoryQueue;
use prhub_store::InMemoryStore;
use prhub_webhook::{build_router, AppState};
use serde_json::json;
use sha2::Sha256;
use tower::ServiceExt;

type HmacSha256 = Hmac<Sha256>;

const SECRET: &str = "test-webhook-secret";

fn test_state() -> AppState {
    let config = PlatformConfig {
        app_id: "123".to_string(),
        private_key_path: None,
        private_key: Some("not a real key".to_string()),
        webhook_secret: Some(SECRET.to_string()),
        oauth_client_id: None,
        oauth_client_secret: None,
    };
    AppState {
        store: Arc::new(InMemoryStore::new()),
        queue: Arc::new(InMemoryQueue::new()),
        broker: Arc::new(CredentialBroker::from_config(&config).unwrap()),
        webhook_secret: Some(SECRET.to_string()),
    }
}

fn sign(body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn opened_payload() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "action": "opened",
        "installation": { "id": 1 },
        "repository": { "id": 12345, "full_name": "acme/widgets" },
        "pull_request": {
            "number": 7,
            "title": "Fix header parsing",
            "user": { "login": "alice" },
            "head": { "ref": "fix/header", "sha": "abc" },
            "base": { "ref": "main", "sha": "def" },
            "merged": false,
            "html_url": "https://github.com/acme/widgets/pull/7",
            "state": "open"
        }
    }))
    .unwrap()
}

async fn post_webhook(state: &AppState, body: Vec<u8>, signature: Option<String>) -> StatusCode {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/platform")
        .header("X-Event-Name", "pull_request")
        .header("X-Delivery-Id", "delivery-1")
        .header("Content-Type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("X-Hub-Signature-256", sig);
    }
    let request = builder.body(Body::from(body)).unwrap();
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    response.status()
}

#[tokio::test]
async fn signature_rejection_returns_401_and_no_mutation() {
    let state = test_state();
    let body = opened_payload();

    let status = post_webhook(&state, body, Some("sha256=".to_string() + &"0".repeat(64))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let pr = state.store.get_pr_by_repo_number("12345", 7).await.unwrap();
    assert!(pr.is_none());
}

#[tokio::test]
async fn replayed_opened_event_creates_exactly_one_pr() {
    let state = test_state();
    let body = opened_payload();

    for _ in 0..3 {
        let signature = sign(&body);
        let status = post_webhook(&state, body.clone(), Some(signature)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let pr = state
        .store
        .get_pr_by_repo_number("12345", 7)
        .await
        .unwrap()
        .expect("pr should exist");
    assert_eq!(pr.title, "Fix header parsing");

    let count = state
        .store
        .count_prs_by_installation_and_repo(1, "12345")
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn opened_event_attributes_author_to_sole_installation_member() {
    use prhub_core::{User, UserRole};
    use prhub_store::Storage;

    let state = test_state();
    state
        .store
        .save_user(User {
            id: "u-1".to_string(),
            platform_id: 99,
            username: "not-alice".to_string(),
            email: String::new(),
            avatar_url: String::new(),
            installation_ids: vec![1],
            role: UserRole::Viewer,
            last_login_at: None,
        })
        .await
        .unwrap();

    let body = opened_payload();
    let signature = sign(&body);
    let status = post_webhook(&state, body, Some(signature)).await;
    assert_eq!(status, StatusCode::OK);

    let pr = state
        .store
        .get_pr_by_repo_number("12345", 7)
        .await
        .unwrap()
        .expect("pr should exist");
    assert_eq!(pr.user_id.as_deref(), Some("u-1"));
}

#[tokio::test]
async fn ping_event_is_acknowledged_without_signature_check() {
    let state = test_state();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/platform")
        .header("X-Event-Name", "ping")
        .header("Content-Type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = build_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_check_responds_ok() {
    let state = test_state();
    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = build_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
