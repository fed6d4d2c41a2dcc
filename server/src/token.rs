//! Access token issuance and verification.
//!
//! Tokens are JWTs signed with HS256 under a single shared secret. The
//! algorithm is fixed: a token whose header names any other algorithm is
//! rejected before its signature is considered, which rules out
//! algorithm-confusion tricks such as re-signing with a different HMAC or
//! declaring `none`.
//!
//! # Claims
//!
//! | Claim | Meaning |
//! |-------|---------|
//! | `sub` | User id (UUID) |
//! | `email` | User email at login time |
//! | `iat` | Issued-at, unix seconds |
//! | `exp` | Expires-at, unix seconds (`iat + ttl`) |
//!
//! Expiry is checked against a caller-supplied `now` with zero leeway, so a
//! token is dead from the second `now >= exp`.
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use tandem_server::token::{TokenError, TokenService};
//! use uuid::Uuid;
//!
//! let tokens = TokenService::new(b"signing-secret", 24);
//! let now = Utc::now();
//! let token = tokens.issue(Uuid::new_v4(), "a@x.com", now).unwrap();
//!
//! assert!(tokens.verify(&token, now).is_ok());
//! assert_eq!(
//!     tokens.verify(&token, now + Duration::hours(25)).unwrap_err(),
//!     TokenError::Expired
//! );
//! ```

use std::fmt;

use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The only algorithm tokens are signed or accepted with.
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

/// Decoded payload of a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// The authenticated user's id.
    pub sub: Uuid,
    pub email: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expires-at, unix seconds.
    pub exp: i64,
}

impl AccessClaims {
    /// The authenticated user's id.
    pub fn user_id(&self) -> Uuid {
        self.sub
    }

    /// Returns true once `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// Reasons a token can fail to issue or verify.
///
/// The variants are for logs and tests. Clients only ever see a single
/// generic "invalid token" response whichever check failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The MAC does not match the payload under the configured secret.
    #[error("invalid signature")]
    InvalidSignature,

    /// `now` is at or past the token's `exp`.
    #[error("token expired")]
    Expired,

    /// The token is not a decodable JWT carrying the expected claims.
    #[error("malformed token")]
    Malformed,

    /// The header declares an algorithm other than HS256.
    #[error("unexpected signing algorithm")]
    AlgorithmMismatch,

    /// Signing failed while issuing.
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidAlgorithm => Self::AlgorithmMismatch,
            _ => Self::Malformed,
        }
    }
}

/// Issues and verifies access tokens under one shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"<redacted>")
            .field("ttl_hours", &self.ttl.num_hours())
            .finish()
    }
}

impl TokenService {
    /// Creates a service signing with `secret`; tokens live `ttl_hours`.
    pub fn new(secret: &[u8], ttl_hours: u32) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::hours(i64::from(ttl_hours)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signs a fresh token for `subject`, valid from `now` for the configured TTL.
    pub fn issue(
        &self,
        subject: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| TokenError::Signing("expiry out of range".to_string()))?;
        let claims = AccessClaims {
            sub: subject,
            email: email.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(TOKEN_ALGORITHM), &claims, &self.encoding)
            .map_err(|err| TokenError::Signing(err.to_string()))
    }

    /// Verifies signature, algorithm and expiry, returning the claims.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        let data = decode::<AccessClaims>(token, &self.decoding, &validation())
            .map_err(|err| classify(token, err))?;
        let claims = data.claims;

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: Option<String>,
}

/// Reads the `alg` field of a token's header without trusting anything else
/// in it.
fn declared_algorithm(token: &str) -> Option<String> {
    let header = token.split('.').next()?;
    let bytes = BASE64_URL_SAFE_NO_PAD.decode(header).ok()?;
    serde_json::from_slice::<RawHeader>(&bytes).ok()?.alg
}

/// Maps a decode failure, treating any declared algorithm other than HS256
/// as a mismatch even when jsonwebtoken does not know its name (`none`).
fn classify(token: &str, err: jsonwebtoken::errors::Error) -> TokenError {
    match declared_algorithm(token) {
        Some(alg) if alg != "HS256" => TokenError::AlgorithmMismatch,
        _ => err.into(),
    }
}

/// HS256 only, `exp` required, expiry left to [`TokenService::verify`] so it
/// can use the caller's clock.
fn validation() -> Validation {
    let mut validation = Validation::new(TOKEN_ALGORITHM);
    validation.leeway = 0;
    validation.validate_exp = false;
    validation.set_required_spec_claims(&["exp"]);
    validation
}
