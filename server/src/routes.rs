//! HTTP route handlers for the Tandem server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `POST /register` - Create an account
//! - `POST /login` - Exchange credentials for an access token
//! - `GET /sessions` - List the caller's sessions (gated)
//! - `POST /sessions` - Create a session with a fresh join code (gated)
//! - `GET /sessions/join/{code}` - Look up a session by join code
//! - `GET /profile` - Echo the caller's token claims (gated)
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - Configuration
//! - The credential store
//! - The token service and join-code allocator
//! - Server start time for uptime reporting
//!
//! Gated routes sit behind [`require_auth`], which verifies the access token
//! and hands its claims to the handler.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tandem_server::config::Config;
//! use tandem_server::routes::{create_router, AppState};
//! use tandem_server::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config, Arc::new(MemoryStore::new()));
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, Method, Request, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info_span};

use crate::accounts::{self, LoginRequest, RegisterRequest};
use crate::auth::{require_auth, AuthUser};
use crate::code::CodeAllocator;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::sessions::{self, CreateSessionRequest, CreatedSession};
use crate::store::CredentialStore;
use crate::token::{AccessClaims, TokenService};
use crate::types::{SessionRecord, UserSummary};

// ============================================================================
// Constants
// ============================================================================

/// Maximum accepted request body (64 KB).
const MAX_BODY_SIZE: usize = 64 * 1024;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Every field is reference counted, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Users and sessions.
    pub store: Arc<dyn CredentialStore>,

    /// Issues and verifies access tokens.
    pub tokens: Arc<TokenService>,

    /// Hands out join codes for new sessions.
    pub codes: Arc<CodeAllocator>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state over `store`, deriving the token service
    /// from the configured secret and lifetime.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use tandem_server::config::Config;
    /// use tandem_server::routes::AppState;
    /// use tandem_server::store::MemoryStore;
    ///
    /// let state = AppState::new(Config::new("secret"), Arc::new(MemoryStore::new()));
    /// assert_eq!(state.tokens.ttl().num_hours(), 24);
    /// ```
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn CredentialStore>) -> Self {
        let tokens = TokenService::new(config.jwt_secret.as_bytes(), config.token_ttl_hours);
        Self::with_components(config, store, tokens, CodeAllocator::new())
    }

    /// Creates application state with a custom token service and allocator.
    ///
    /// Useful for testing with seeded allocators.
    #[must_use]
    pub fn with_components(
        config: Config,
        store: Arc<dyn CredentialStore>,
        tokens: TokenService,
        codes: CodeAllocator,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            tokens: Arc::new(tokens),
            codes: Arc::new(codes),
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &"<CredentialStore>")
            .field("tokens", &self.tokens)
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// Every route gets request tracing, a per-request deadline
/// (`408 Request Timeout` once `config.request_timeout` passes) and a
/// permissive CORS policy without credentials.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/sessions", get(get_sessions).post(post_sessions))
        .route("/profile", get(get_profile))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // Spans carry the path only; the query string may hold an access token.
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
        info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
        )
    });

    Router::new()
        .route("/register", post(post_register))
        .route("/login", post(post_login))
        .route("/sessions/join/{code}", get(get_join))
        .route("/health", get(get_health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(cors)
        .layer(trace)
        .with_state(state)
}

/// Parses a JSON body, reporting any problem as a 400.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|err| {
        debug!(error = %err, "Invalid request body");
        ApiError::validation(format!("invalid request body: {err}"))
    })
}

// ============================================================================
// POST /register, POST /login
// ============================================================================

/// Response body for a successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// POST /register - Create an account.
///
/// # Responses
///
/// - `201 Created` - `{id, email}`
/// - `400 Bad Request` - Malformed body, invalid email, short password, or
///   email already registered
async fn post_register(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let request: RegisterRequest = parse_body(&body)?;
    let user: UserSummary = accounts::register(state.store.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /login - Exchange credentials for an access token.
///
/// # Responses
///
/// - `200 OK` - `{token}`
/// - `400 Bad Request` - Malformed body or empty fields
/// - `401 Unauthorized` - Unknown email or wrong password (indistinguishable)
async fn post_login(State(state): State<AppState>, body: Bytes) -> Result<Json<LoginResponse>> {
    let request: LoginRequest = parse_body(&body)?;
    let token = accounts::login(state.store.as_ref(), &state.tokens, request, Utc::now()).await?;
    Ok(Json(LoginResponse { token }))
}

// ============================================================================
// GET /sessions, POST /sessions, GET /sessions/join/{code}
// ============================================================================

/// Response body listing the caller's sessions.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionRecord>,
}

/// Response body for a join-code lookup.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinResponse {
    pub session: SessionRecord,
}

/// GET /sessions - Sessions owned by the caller, newest first.
async fn get_sessions(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<SessionListResponse>> {
    let sessions = sessions::list_sessions(state.store.as_ref(), claims.user_id()).await?;
    Ok(Json(SessionListResponse { sessions }))
}

/// POST /sessions - Create a session owned by the caller.
///
/// # Request Body
///
/// `{"name": "...", "maxCollaborators": 5}`; `maxCollaborators` is optional
/// and defaults to 5.
///
/// # Responses
///
/// - `201 Created` - `{id, code, name, maxCollaborators}`
/// - `400 Bad Request` - Blank name or invalid capacity
async fn post_sessions(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let request: CreateSessionRequest = parse_body(&body)?;
    let record = sessions::create_session(
        state.store.as_ref(),
        &state.codes,
        claims.user_id(),
        request,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(CreatedSession::from(&record))))
}

/// GET /sessions/join/{code} - Look up a session by join code.
///
/// No authentication required; a join code only locates a session.
async fn get_join(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<JoinResponse>> {
    let session = sessions::join_session(state.store.as_ref(), &code).await?;
    Ok(Json(JoinResponse { session }))
}

// ============================================================================
// GET /profile
// ============================================================================

/// Response body echoing the caller's claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub profile: AccessClaims,
}

/// GET /profile - The verified claims of the caller's token.
async fn get_profile(AuthUser(claims): AuthUser) -> Json<ProfileResponse> {
    Json(ProfileResponse { profile: claims })
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
///
/// No authentication required.
///
/// ```json
/// { "status": "ok", "uptime_seconds": 3600 }
/// ```
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================
