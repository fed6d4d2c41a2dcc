//! Credential store abstraction.
//!
//! Every handler talks to persistence through [`CredentialStore`]. Each call is
//! a single atomic statement; nothing here spans a transaction. Uniqueness of
//! user emails and session codes is enforced by the store itself and reported
//! as [`StoreError::Conflict`], so callers can treat a pre-check as a fast path
//! and still be correct when two requests race past it.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`] - process-local, used in tests and for quick local runs
//! - [`SqlStore`] - SQLite through sqlx, used by the server binary

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{NewSession, SessionRecord, UserCredential};

mod memory;
mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

/// Errors surfaced by a credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write. Carries the column name.
    #[error("unique constraint violated on {0}")]
    Conflict(&'static str),

    /// The backing database failed (connectivity, query, pool exhaustion).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be turned into a record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns `true` if this is a unique-constraint conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Persistence operations used by the accounts and sessions services.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Number of users registered under exactly this email.
    async fn count_users_by_email(&self, email: &str) -> Result<u64, StoreError>;

    /// Inserts a new user. Fails with `Conflict("email")` if the email exists.
    async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<UserCredential, StoreError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserCredential>, StoreError>;

    /// Number of sessions currently holding this join code.
    async fn count_sessions_by_code(&self, code: &str) -> Result<u64, StoreError>;

    /// Inserts a new session. Fails with `Conflict("code")` if the code exists.
    async fn insert_session(&self, session: NewSession) -> Result<SessionRecord, StoreError>;

    /// Sessions owned by `owner_id`, newest first.
    async fn list_sessions_by_owner(&self, owner_id: Uuid)
        -> Result<Vec<SessionRecord>, StoreError>;

    async fn get_session_by_code(&self, code: &str) -> Result<Option<SessionRecord>, StoreError>;
}
