//! Authorization gate for protected routes.
//!
//! [`require_auth`] runs as middleware in front of every protected handler.
//! It takes the access token from the `Authorization: Bearer <token>` header,
//! or failing that from a `token` query parameter, verifies it, and stores
//! the decoded [`AccessClaims`] in the request extensions. Handlers read them
//! back with the [`AuthUser`] extractor.
//!
//! A request without a token gets `401 missing token`. Every verification
//! failure (bad signature, expiry, wrong algorithm, garbage) gets the same
//! `401 invalid token`; the specific reason only goes to the debug log.
//!
//! # Example
//!
//! ```rust
//! use axum::http::{header, HeaderMap, Uri};
//! use tandem_server::auth::extract_token;
//!
//! let mut headers = HeaderMap::new();
//! headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
//! let uri: Uri = "/sessions?token=xyz".parse().unwrap();
//!
//! assert_eq!(extract_token(&headers, &uri).as_deref(), Some("abc"));
//! ```

use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Uri};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;
use crate::routes::AppState;
use crate::token::AccessClaims;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}

/// Finds the access token on a request.
///
/// A non-empty bearer header wins over the `token` query parameter.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token);
    }

    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty())
}

/// Middleware that admits only requests carrying a valid access token.
///
/// Install with [`axum::middleware::from_fn_with_state`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = extract_token(request.headers(), request.uri()) else {
        debug!(path = %request.uri().path(), "Rejected request without token");
        return Err(ApiError::MissingToken);
    };

    let claims = match state.tokens.verify(&token, Utc::now()) {
        Ok(claims) => claims,
        Err(err) => {
            debug!(path = %request.uri().path(), reason = %err, "Rejected token");
            return Err(ApiError::InvalidToken);
        }
    };

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Claims of the caller, placed on the request by [`require_auth`].
///
/// Extracting this on a route without the gate is a 401, not a panic.
#[derive(Debug, Clone)]
pub struct AuthUser(pub AccessClaims);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessClaims>()
            .cloned()
            .map(AuthUser)
            .ok_or(ApiError::MissingToken)
    }
}
