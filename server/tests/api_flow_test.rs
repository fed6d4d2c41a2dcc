//! End-to-end HTTP tests for the Tandem server.
//!
//! These drive the full router (gate, handlers, store) with
//! `tower::ServiceExt::oneshot`, against both the in-memory store and an
//! in-memory SQLite database.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tokio_test::assert_ok;
use tower::ServiceExt;
use uuid::Uuid;

use tandem_server::config::Config;
use tandem_server::routes::{create_router, AppState};
use tandem_server::store::{CredentialStore, MemoryStore, SqlStore, StoreError};
use tandem_server::token::TokenService;
use tandem_server::types::{NewSession, SessionRecord, UserCredential};

const SECRET: &str = "integration-test-secret";

// ============================================================================
// Helpers
// ============================================================================

fn memory_app() -> Router {
    create_router(AppState::new(
        Config::new(SECRET),
        Arc::new(MemoryStore::new()),
    ))
}

async fn sql_app() -> Router {
    let store = assert_ok!(SqlStore::connect("sqlite::memory:").await);
    create_router(AppState::new(Config::new(SECRET), Arc::new(store)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn register_and_login(app: &Router, email: &str, password: &str) -> String {
    let creds = json!({ "email": email, "password": password });

    let (status, _) = send(app, post("/register", creds.clone(), None)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(app, post("/login", creds, None)).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

// ============================================================================
// Full flow
// ============================================================================

async fn run_full_flow(app: Router) {
    let creds = json!({ "email": "a@x.com", "password": "secret1" });

    let (status, user) = send(&app, post("/register", creds.clone(), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["email"], "a@x.com");
    assert!(user.get("password").is_none());
    assert!(user.get("password_hash").is_none());

    let (status, body) = send(&app, post("/login", creds, None)).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get("/sessions", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions"], json!([]));

    let (status, created) = send(&app, post("/sessions", json!({ "name": "s1" }), Some(&token))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "s1");
    assert_eq!(created["maxCollaborators"], 5);
    let code = created["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert!(code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));

    let (status, body) = send(&app, get(&format!("/sessions/join/{code}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let session = &body["session"];
    assert_eq!(session["id"], created["id"]);
    assert_eq!(session["code"], code.as_str());
    assert_eq!(session["name"], "s1");
    assert_eq!(session["owner_id"], user["id"]);
    assert_eq!(session["max_collaborators"], 5);
    assert_eq!(session["status"], "active");

    let (status, body) = send(&app, get("/sessions", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
    assert_eq!(body["sessions"][0]["code"], code.as_str());
}

#[tokio::test]
async fn full_flow_with_memory_store() {
    run_full_flow(memory_app()).await;
}

#[tokio::test]
async fn full_flow_with_sql_store() {
    run_full_flow(sql_app().await).await;
}

#[tokio::test]
async fn sessions_are_listed_newest_first_and_per_owner() {
    let app = sql_app().await;
    let alice = register_and_login(&app, "alice@x.com", "secret1").await;
    let bob = register_and_login(&app, "bob@x.com", "secret2").await;

    for name in ["first", "second", "third"] {
        let (status, _) = send(&app, post("/sessions", json!({ "name": name }), Some(&alice))).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _) = send(&app, post("/sessions", json!({ "name": "bobs" }), Some(&bob))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, get("/sessions", Some(&alice))).await;
    let names: Vec<&str> = body["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["third", "second", "first"]);

    let (_, body) = send(&app, get("/sessions", Some(&bob))).await;
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn join_code_lookup_ignores_case() {
    let app = memory_app();
    let token = register_and_login(&app, "a@x.com", "secret1").await;

    let (_, created) = send(&app, post("/sessions", json!({ "name": "s1" }), Some(&token))).await;
    let code = created["code"].as_str().unwrap().to_ascii_lowercase();

    let (status, body) = send(&app, get(&format!("/sessions/join/{code}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["id"], created["id"]);
}

// ============================================================================
// Credential failures
// ============================================================================

#[tokio::test]
async fn wrong_password_and_unknown_user_get_identical_responses() {
    let app = memory_app();
    register_and_login(&app, "a@x.com", "secret1").await;

    let wrong = send(
        &app,
        post("/login", json!({ "email": "a@x.com", "password": "wrongpw" }), None),
    )
    .await;
    let unknown = send(
        &app,
        post("/login", json!({ "email": "nouser@x.com", "password": "x" }), None),
    )
    .await;

    assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, unknown);
}

#[tokio::test]
async fn duplicate_email_is_rejected_over_sql() {
    let app = sql_app().await;
    let creds = json!({ "email": "a@x.com", "password": "secret1" });

    let (status, _) = send(&app, post("/register", creds.clone(), None)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, post("/register", creds, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "email_taken");

    let (status, _) = send(
        &app,
        post("/login", json!({ "email": "a@x.com", "password": "secret1" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Token failures
// ============================================================================

#[tokio::test]
async fn expired_and_foreign_tokens_get_identical_responses() {
    let app = memory_app();
    let user = Uuid::new_v4();

    let expired = TokenService::new(SECRET.as_bytes(), 1)
        .issue(user, "a@x.com", Utc::now() - chrono::Duration::hours(2))
        .unwrap();
    let foreign = TokenService::new(b"not-the-server-secret", 24)
        .issue(user, "a@x.com", Utc::now())
        .unwrap();

    let expired = send(&app, get("/sessions", Some(&expired))).await;
    let foreign = send(&app, get("/sessions", Some(&foreign))).await;

    assert_eq!(expired.0, StatusCode::UNAUTHORIZED);
    assert_eq!(expired.1["error"], "invalid token");
    assert_eq!(expired, foreign);
}

#[tokio::test]
async fn token_in_query_parameter_is_accepted() {
    let app = memory_app();
    let token = register_and_login(&app, "a@x.com", "secret1").await;

    let (status, body) = send(&app, get(&format!("/profile?token={token}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"]["email"], "a@x.com");
}

#[tokio::test]
async fn bearer_header_takes_precedence_over_query() {
    let app = memory_app();
    let token = register_and_login(&app, "a@x.com", "secret1").await;

    // Valid query token, invalid header token: the header is used and fails.
    let (status, body) = send(
        &app,
        get(&format!("/profile?token={token}"), Some("garbage")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_token");

    // And the other way round succeeds.
    let (status, _) = send(&app, get("/profile?token=garbage", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Request deadline
// ============================================================================

/// Store whose join-code lookup never finishes in time.
struct SlowStore;

#[async_trait]
impl CredentialStore for SlowStore {
    async fn count_users_by_email(&self, _: &str) -> Result<u64, StoreError> {
        Ok(0)
    }
    async fn insert_user(&self, _: &str, _: &str) -> Result<UserCredential, StoreError> {
        Err(StoreError::Corrupt("read-only".into()))
    }
    async fn get_user_by_email(&self, _: &str) -> Result<Option<UserCredential>, StoreError> {
        Ok(None)
    }
    async fn count_sessions_by_code(&self, _: &str) -> Result<u64, StoreError> {
        Ok(0)
    }
    async fn insert_session(&self, _: NewSession) -> Result<SessionRecord, StoreError> {
        Err(StoreError::Corrupt("read-only".into()))
    }
    async fn list_sessions_by_owner(&self, _: Uuid) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(Vec::new())
    }
    async fn get_session_by_code(&self, _: &str) -> Result<Option<SessionRecord>, StoreError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(None)
    }
}

#[tokio::test]
async fn slow_requests_time_out_with_408() {
    let mut config = Config::new(SECRET);
    config.request_timeout = Duration::from_millis(100);
    let app = create_router(AppState::new(config, Arc::new(SlowStore)));

    let (status, _) = send(&app, get("/sessions/join/ABCDEF", None)).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn internal_failures_do_not_leak_detail() {
    let app = create_router(AppState::new(Config::new(SECRET), Arc::new(SlowStore)));
    let token = TokenService::new(SECRET.as_bytes(), 24)
        .issue(Uuid::new_v4(), "a@x.com", Utc::now())
        .unwrap();

    let (status, body) = send(&app, post("/sessions", json!({ "name": "s1" }), Some(&token))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");
    assert_eq!(body["code"], "internal_error");
    assert!(!body.to_string().contains("read-only"));
}
