//! SQLite-backed credential store.
//!
//! Uniqueness lives in the schema: `users.email` and `sessions.code` carry
//! `UNIQUE` constraints, and a violation is mapped to
//! [`StoreError::Conflict`]. Statements run against a pooled connection, so
//! the store can be shared across request tasks.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};
use uuid::Uuid;

use super::{CredentialStore, StoreError};
use crate::types::{NewSession, SessionRecord, SessionStatus, UserCredential};

/// Pool size for file-backed databases.
const MAX_CONNECTIONS: u32 = 8;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sessions (
        id BLOB PRIMARY KEY NOT NULL,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        owner_id BLOB REFERENCES users(id),
        max_collaborators INTEGER NOT NULL DEFAULT 5 CHECK (max_collaborators > 0),
        status TEXT NOT NULL DEFAULT 'active',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_sessions_owner ON sessions (owner_id)",
];

const SESSION_COLUMNS: &str =
    "id, code, name, owner_id, max_collaborators, status, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserCredential {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    code: String,
    name: String,
    owner_id: Option<Uuid>,
    max_collaborators: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let max_collaborators = u32::try_from(row.max_collaborators).map_err(|_| {
            StoreError::Corrupt(format!(
                "session {} has max_collaborators {}",
                row.id, row.max_collaborators
            ))
        })?;
        let status = SessionStatus::from_str(&row.status).map_err(StoreError::Corrupt)?;

        Ok(Self {
            id: row.id,
            code: row.code,
            name: row.name,
            owner_id: row.owner_id,
            max_collaborators,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Credential store over a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    ///
    /// `sqlite::memory:` URLs get a single long-lived connection, since every
    /// new connection to an in-memory database would see an empty one.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;

        info!(in_memory, "Credential store ready");
        Ok(store)
    }

    /// Creates tables and indexes that do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Schema applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Maps a unique-constraint violation to `Conflict`, anything else to `Database`.
fn insert_error(err: sqlx::Error, column: &'static str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(column);
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl CredentialStore for SqlStore {
    async fn count_users_by_email(&self, email: &str) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<UserCredential, StoreError> {
        let user = UserCredential {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|err| insert_error(err, "email"))?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserCredential>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserCredential::from))
    }

    async fn count_sessions_by_code(&self, code: &str) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM sessions WHERE code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn insert_session(&self, session: NewSession) -> Result<SessionRecord, StoreError> {
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

        sqlx::query(
            "INSERT INTO sessions (id, code, name, owner_id, max_collaborators, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(&record.code)
        .bind(&record.name)
        .bind(record.owner_id)
        .bind(i64::from(record.max_collaborators))
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| insert_error(err, "code"))?;

        Ok(record)
    }

    async fn list_sessions_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE owner_id = ? ORDER BY rowid DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRecord::try_from).collect()
    }

    async fn get_session_by_code(&self, code: &str) -> Result<Option<SessionRecord>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE code = ?"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRecord::try_from).transpose()
    }
}
