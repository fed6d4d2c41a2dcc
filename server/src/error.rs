//! Error types for the Tandem server.
//!
//! Handlers return [`ApiError`], which renders as a JSON body with a stable
//! machine-readable `code` and a short message. Client errors say what was
//! wrong with the request. Server errors carry an [`InternalError`] with the
//! real cause: it is logged when the response is built and never sent.
//!
//! Authentication failures are deliberately coarse. A wrong password and an
//! unknown email produce the same `invalid_credentials` response, and every
//! way a token can fail verification produces the same `invalid_token`
//! response.
//!
//! # Example
//!
//! ```rust
//! use tandem_server::error::ApiError;
//!
//! let err = ApiError::validation("name is required");
//! assert!(err.is_client_error());
//! assert_eq!(err.code(), "invalid_request");
//! ```

use std::error::Error;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tracing::error;

use crate::code::AllocError;
use crate::password::PasswordError;
use crate::store::StoreError;
use crate::token::TokenError;

/// Server-side failure detail. Logged, never returned to clients.
#[derive(ThisError, Debug)]
pub enum InternalError {
    #[error("credential store: {0}")]
    Store(#[from] StoreError),

    #[error("password hashing: {0}")]
    Password(#[from] PasswordError),

    #[error("token issuance: {0}")]
    Token(TokenError),

    #[error("join code allocation exhausted after {attempts} attempts")]
    CodeExhausted { attempts: usize },
}

impl InternalError {
    /// Short label for the failure kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(_) => "store",
            Self::Password(_) => "password",
            Self::Token(_) => "token",
            Self::CodeExhausted { .. } => "code_exhausted",
        }
    }
}

/// Error returned by request handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or missing request fields. Rejected before touching storage.
    Validation(String),

    /// Registration with an email that already has an account.
    EmailTaken,

    /// Login with an unknown email or a wrong password.
    InvalidCredentials,

    /// A protected route was called without a token.
    MissingToken,

    /// A token was presented but failed verification for any reason.
    InvalidToken,

    /// The requested resource does not exist.
    NotFound(&'static str),

    /// Anything the client cannot fix.
    Internal(InternalError),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::EmailTaken => write!(f, "email already registered"),
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::MissingToken => write!(f, "missing token"),
            Self::InvalidToken => write!(f, "invalid token"),
            Self::NotFound(what) => write!(f, "{what} not found"),
            Self::Internal(err) => write!(f, "internal server error: {err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Internal(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InternalError> for ApiError {
    fn from(err: InternalError) -> Self {
        Self::Internal(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.into())
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        Self::Internal(err.into())
    }
}

impl From<AllocError> for ApiError {
    fn from(err: AllocError) -> Self {
        Self::Internal(err.into())
    }
}

impl From<AllocError> for InternalError {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::CodeGenerationExhausted { attempts } => Self::CodeExhausted { attempts },
            AllocError::Store(err) => Self::Store(err),
        }
    }
}

impl ApiError {
    /// Creates a new validation error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tandem_server::error::ApiError;
    ///
    /// let err = ApiError::validation("password too short");
    /// assert!(matches!(err, ApiError::Validation(_)));
    /// ```
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wraps a token signing failure as an internal error.
    pub fn token_signing(err: TokenError) -> Self {
        Self::Internal(InternalError::Token(err))
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::EmailTaken => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::MissingToken | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request",
            Self::EmailTaken => "email_taken",
            Self::InvalidCredentials => "invalid_credentials",
            Self::MissingToken => "missing_token",
            Self::InvalidToken => "invalid_token",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message sent to clients. Internal detail is replaced by a fixed string.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Returns `true` if this error indicates a client-side problem.
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this error indicates a server-side problem.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

/// JSON error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref err) = self {
            error!(kind = err.kind(), error = %err, "Request failed");
        }

        let body = ErrorResponse::new(self.public_message()).with_code(self.code());
        (self.status(), Json(body)).into_response()
    }
}

/// A specialized Result type for handler operations.
pub type Result<T> = std::result::Result<T, ApiError>;
