//! Registration and login.
//!
//! Registration checks for an existing account, hashes the password and
//! inserts the user. The existence check is a fast path only; the store's
//! unique constraint on email turns a lost race into the same
//! [`ApiError::EmailTaken`] answer.
//!
//! Login never tells the caller which part failed. An unknown email and a
//! wrong password both return [`ApiError::InvalidCredentials`], and an unknown
//! email still pays for one password verification so the two cases take about
//! as long.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::password;
use crate::store::{CredentialStore, StoreError};
use crate::token::TokenService;
use crate::types::UserSummary;

/// Shortest password accepted at registration, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Longest password accepted, in bytes.
pub const MAX_PASSWORD_LENGTH: usize = 1024;

/// Longest email accepted, in bytes.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Body of `POST /register`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Checks that `email` looks like `local@domain.tld`.
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(ApiError::validation("email is required"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ApiError::validation("email is too long"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(ApiError::validation("email must not contain whitespace"));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ApiError::validation("email must be a valid address"));
    };
    let domain_ok = !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..");
    if local.is_empty() || !domain_ok {
        return Err(ApiError::validation("email must be a valid address"));
    }

    Ok(())
}

fn validate_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ApiError::validation("password is too long"));
    }
    Ok(())
}

/// Creates an account and returns its public summary.
///
/// # Errors
///
/// - [`ApiError::Validation`] for a malformed email or short password
/// - [`ApiError::EmailTaken`] if the email already has an account
/// - [`ApiError::Internal`] for hashing or storage failures
pub async fn register(store: &dyn CredentialStore, request: RegisterRequest) -> Result<UserSummary> {
    let RegisterRequest { email, password } = request;
    validate_email(&email)?;
    validate_new_password(&password)?;

    if store.count_users_by_email(&email).await? > 0 {
        debug!("Registration rejected: email already registered");
        return Err(ApiError::EmailTaken);
    }

    let password_hash = password::hash_blocking(password).await?;

    let user = match store.insert_user(&email, &password_hash).await {
        Ok(user) => user,
        Err(StoreError::Conflict(_)) => {
            debug!("Registration lost race on email uniqueness");
            return Err(ApiError::EmailTaken);
        }
        Err(err) => return Err(err.into()),
    };

    info!(user_id = %user.id, "User registered");
    Ok(user.summary())
}

/// Verifies credentials and issues an access token valid from `now`.
///
/// # Errors
///
/// - [`ApiError::Validation`] for a malformed email or an empty password
/// - [`ApiError::InvalidCredentials`] for an unknown email or wrong password
/// - [`ApiError::Internal`] for storage, hashing or signing failures
pub async fn login(
    store: &dyn CredentialStore,
    tokens: &TokenService,
    request: LoginRequest,
    now: DateTime<Utc>,
) -> Result<String> {
    let LoginRequest { email, password } = request;
    validate_email(&email)?;
    if password.is_empty() {
        return Err(ApiError::validation("password is required"));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ApiError::InvalidCredentials);
    }

    let user = store.get_user_by_email(&email).await?;
    let digest = user.as_ref().map(|u| u.password_hash.clone());
    let matched = password::verify_blocking(password, digest).await?;

    let user = match user {
        Some(user) if matched => user,
        _ => {
            debug!("Login rejected");
            return Err(ApiError::InvalidCredentials);
        }
    };

    let token = tokens
        .issue(user.id, &user.email, now)
        .map_err(ApiError::token_signing)?;

    info!(user_id = %user.id, "User logged in");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{NewSession, SessionRecord, UserCredential};

    fn register_request(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn tokens() -> TokenService {
        TokenService::new(b"accounts-test-secret", 24)
    }

    #[test]
    fn validate_email_accepts_plain_addresses() {
        for email in ["a@x.com", "first.last+tag@sub.example.org"] {
            assert!(validate_email(email).is_ok(), "{email}");
        }
    }

    #[test]
    fn validate_email_rejects_bad_addresses() {
        for email in [
            "",
            "no-at-sign",
            "@x.com",
            "a@",
            "a@localhost",
            "a@.com",
            "a@x.com.",
            "a@x..com",
            "a@b@x.com",
            "a b@x.com",
        ] {
            assert!(
                matches!(validate_email(email), Err(ApiError::Validation(_))),
                "{email:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn register_then_login_issues_verifiable_token() {
        let store = MemoryStore::new();
        let tokens = tokens();

        let summary = register(&store, register_request("a@x.com", "secret1"))
            .await
            .unwrap();
        assert_eq!(summary.email, "a@x.com");

        let now = Utc::now();
        let token = login(&store, &tokens, login_request("a@x.com", "secret1"), now)
            .await
            .unwrap();

        let claims = tokens.verify(&token, now).unwrap();
        assert_eq!(claims.sub, summary.id);
        assert_eq!(claims.email, "a@x.com");
    }

    #[tokio::test]
    async fn register_stores_hash_not_plaintext() {
        let store = MemoryStore::new();
        register(&store, register_request("a@x.com", "secret1"))
            .await
            .unwrap();

        let user = store.get_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_ne!(user.password_hash, "secret1");
        assert!(password::verify("secret1", &user.password_hash));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected_and_first_user_kept() {
        let store = MemoryStore::new();
        let first = register(&store, register_request("a@x.com", "secret1"))
            .await
            .unwrap();

        let err = register(&store, register_request("a@x.com", "other-pass"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::EmailTaken));

        let stored = store.get_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert!(password::verify("secret1", &stored.password_hash));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn register_validates_before_touching_store() {
        let store = MemoryStore::new();

        let err = register(&store, register_request("a@x.com", "short"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = register(&store, register_request("not-an-email", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        assert_eq!(store.user_count(), 0);
    }

    /// Store where another request always registers the email between the
    /// existence check and the insert.
    struct RacedEmailStore;

    #[async_trait]
    impl CredentialStore for RacedEmailStore {
        async fn count_users_by_email(&self, _: &str) -> std::result::Result<u64, StoreError> {
            Ok(0)
        }
        async fn insert_user(
            &self,
            _: &str,
            _: &str,
        ) -> std::result::Result<UserCredential, StoreError> {
            Err(StoreError::Conflict("email"))
        }
        async fn get_user_by_email(
            &self,
            _: &str,
        ) -> std::result::Result<Option<UserCredential>, StoreError> {
            Ok(None)
        }
        async fn count_sessions_by_code(&self, _: &str) -> std::result::Result<u64, StoreError> {
            Ok(0)
        }
        async fn insert_session(
            &self,
            _: NewSession,
        ) -> std::result::Result<SessionRecord, StoreError> {
            Err(StoreError::Corrupt("not used".into()))
        }
        async fn list_sessions_by_owner(
            &self,
            _: Uuid,
        ) -> std::result::Result<Vec<SessionRecord>, StoreError> {
            Ok(Vec::new())
        }
        async fn get_session_by_code(
            &self,
            _: &str,
        ) -> std::result::Result<Option<SessionRecord>, StoreError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn email_conflict_at_insert_is_email_taken() {
        let err = register(&RacedEmailStore, register_request("a@x.com", "secret1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::EmailTaken), "got {err:?}");
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn login_rejects_malformed_email_before_lookup() {
        let store = MemoryStore::new();
        let tokens = tokens();
        register(&store, register_request("a@x.com", "secret1"))
            .await
            .unwrap();

        for email in ["not-an-email", "a@x", "a b@x.com"] {
            let err = login(&store, &tokens, login_request(email, "secret1"), Utc::now())
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)), "{email:?}");
        }
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let store = MemoryStore::new();
        let tokens = tokens();
        register(&store, register_request("a@x.com", "secret1"))
            .await
            .unwrap();

        let wrong = login(&store, &tokens, login_request("a@x.com", "wrongpass"), Utc::now())
            .await
            .unwrap_err();
        let unknown = login(&store, &tokens, login_request("nouser@x.com", "x"), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(wrong, ApiError::InvalidCredentials));
        assert!(matches!(unknown, ApiError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.code(), unknown.code());
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let store = MemoryStore::new();
        let tokens = tokens();

        let err = login(&store, &tokens, login_request("", "secret1"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = login(&store, &tokens, login_request("a@x.com", ""), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn each_login_is_an_independent_token() {
        let store = MemoryStore::new();
        let tokens = tokens();
        register(&store, register_request("a@x.com", "secret1"))
            .await
            .unwrap();

        let now = Utc::now();
        let first = login(&store, &tokens, login_request("a@x.com", "secret1"), now)
            .await
            .unwrap();
        let later = now + chrono::Duration::seconds(5);
        let second = login(&store, &tokens, login_request("a@x.com", "secret1"), later)
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(tokens.verify(&first, later).is_ok());
        assert!(tokens.verify(&second, later).is_ok());
    }
}
