//! In-memory credential store.
//!
//! Keeps users and sessions behind a single [`RwLock`]. The uniqueness check
//! and the insert happen under the same write guard, which gives the same
//! guarantee a unique index gives the SQL store.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::trace;
use uuid::Uuid;

use super::{CredentialStore, StoreError};
use crate::types::{NewSession, SessionRecord, UserCredential};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<UserCredential>,
    /// Insertion order; listing walks it backwards for newest-first.
    sessions: Vec<SessionRecord>,
}

/// Thread-safe process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users currently stored.
    pub fn user_count(&self) -> usize {
        self.read(|t| t.users.len())
    }

    /// Number of sessions currently stored.
    pub fn session_count(&self) -> usize {
        self.read(|t| t.sessions.len())
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        f(&tables)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut tables)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn count_users_by_email(&self, email: &str) -> Result<u64, StoreError> {
        Ok(self.read(|t| t.users.iter().filter(|u| u.email == email).count() as u64))
    }

    async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<UserCredential, StoreError> {
        self.write(|t| {
            if t.users.iter().any(|u| u.email == email) {
                return Err(StoreError::Conflict("email"));
            }
            let user = UserCredential {
                id: Uuid::new_v4(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                created_at: Utc::now(),
            };
            trace!(user_id = %user.id, "Inserted user");
            t.users.push(user.clone());
            Ok(user)
        })
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserCredential>, StoreError> {
        Ok(self.read(|t| t.users.iter().find(|u| u.email == email).cloned()))
    }

    async fn count_sessions_by_code(&self, code: &str) -> Result<u64, StoreError> {
        Ok(self.read(|t| t.sessions.iter().filter(|s| s.code == code).count() as u64))
    }

    async fn insert_session(&self, session: NewSession) -> Result<SessionRecord, StoreError> {
        self.write(|t| {
            if t.sessions.iter().any(|s| s.code == session.code) {
                return Err(StoreError::Conflict("code"));
            }
            let now = Utc::now();
            let record = SessionRecord {
                id: Uuid::new_v4(),
                code: session.code,
                name: session.name,
                owner_id: session.owner_id,
                max_collaborators: session.max_collaborators,
                status: session.status,
                created_at: now,
                updated_at: now,
            };
            trace!(session_id = %record.id, "Inserted session");
            t.sessions.push(record.clone());
            Ok(record)
        })
    }

    async fn list_sessions_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.read(|t| {
            t.sessions
                .iter()
                .rev()
                .filter(|s| s.owner_id == Some(owner_id))
                .cloned()
                .collect()
        }))
    }

    async fn get_session_by_code(&self, code: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.read(|t| t.sessions.iter().find(|s| s.code == code).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionStatus;

    fn new_session(code: &str, owner_id: Option<Uuid>) -> NewSession {
        NewSession {
            code: code.to_string(),
            name: format!("session {code}"),
            owner_id,
            max_collaborators: 5,
            status: SessionStatus::Active,
        }
    }

    #[tokio::test]
    async fn insert_user_rejects_duplicate_email() {
        let store = MemoryStore::new();
        let first = store.insert_user("a@x.com", "hash-1").await.unwrap();

        let err = store.insert_user("a@x.com", "hash-2").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict("email")));

        let stored = store.get_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored, first);
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn email_lookup_is_case_sensitive() {
        let store = MemoryStore::new();
        store.insert_user("a@x.com", "hash").await.unwrap();

        assert_eq!(store.count_users_by_email("a@x.com").await.unwrap(), 1);
        assert_eq!(store.count_users_by_email("A@X.COM").await.unwrap(), 0);
        assert!(store.get_user_by_email("A@x.com").await.unwrap().is_none());
        assert!(store.insert_user("A@x.com", "hash").await.is_ok());
    }

    #[tokio::test]
    async fn insert_session_rejects_duplicate_code() {
        let store = MemoryStore::new();
        store.insert_session(new_session("AAAAAA", None)).await.unwrap();

        let err = store
            .insert_session(new_session("AAAAAA", None))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.session_count(), 1);
        assert_eq!(store.count_sessions_by_code("AAAAAA").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_sessions_is_owner_scoped_and_newest_first() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.insert_session(new_session("AAAAA1", Some(alice))).await.unwrap();
        store.insert_session(new_session("BBBBB1", Some(bob))).await.unwrap();
        store.insert_session(new_session("AAAAA2", Some(alice))).await.unwrap();

        let codes: Vec<String> = store
            .list_sessions_by_owner(alice)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.code)
            .collect();
        assert_eq!(codes, vec!["AAAAA2", "AAAAA1"]);
    }

    #[tokio::test]
    async fn get_session_by_code_returns_none_when_missing() {
        let store = MemoryStore::new();
        assert!(store.get_session_by_code("ZZZZZZ").await.unwrap().is_none());
    }
}
