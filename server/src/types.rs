//! Shared record types for the Tandem server.
//!
//! These are the shapes persisted by the credential store and returned to
//! clients. Password hashes never leave the server: [`UserCredential`] is not
//! `Serialize`, and clients only ever see a [`UserSummary`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of a join code.
pub const CODE_LENGTH: usize = 6;

/// Capacity given to a session when the creator does not ask for one.
pub const DEFAULT_MAX_COLLABORATORS: u32 = 5;

/// A registered user as stored, including the password digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredential {
    pub id: Uuid,
    /// Unique, compared case-sensitively.
    pub email: String,
    /// PHC-format Argon2id digest.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl UserCredential {
    /// Public projection of this user.
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            email: self.email.clone(),
        }
    }
}

/// What a client learns about a user after registering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
}

/// Lifecycle state of a collaborative session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

/// A collaborative session located by its join code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    pub max_collaborators: u32,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a session. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub code: String,
    pub name: String,
    pub owner_id: Option<Uuid>,
    pub max_collaborators: u32,
    pub status: SessionStatus,
}
