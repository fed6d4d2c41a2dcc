//! Collaborative session records: create, list and join.
//!
//! Creation allocates a join code and inserts the record. A code can be taken
//! between the allocator's check and the insert; the store's unique constraint
//! catches that, and creation draws a fresh code and tries again, a bounded
//! number of times.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::code::CodeAllocator;
use crate::error::{ApiError, InternalError, Result};
use crate::store::{CredentialStore, StoreError};
use crate::types::{NewSession, SessionRecord, SessionStatus, DEFAULT_MAX_COLLABORATORS};

/// Inserts attempted before creation gives up on racing code allocations.
pub const MAX_INSERT_ATTEMPTS: usize = 3;

/// Longest session name accepted, in characters.
pub const MAX_NAME_LENGTH: usize = 200;

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub name: String,
    /// Absent or zero means [`DEFAULT_MAX_COLLABORATORS`].
    #[serde(default)]
    pub max_collaborators: Option<i64>,
}

/// Response of `POST /sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub max_collaborators: u32,
}

impl From<&SessionRecord> for CreatedSession {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            code: record.code.clone(),
            name: record.name.clone(),
            max_collaborators: record.max_collaborators,
        }
    }
}

fn resolve_capacity(requested: Option<i64>) -> Result<u32> {
    match requested {
        None | Some(0) => Ok(DEFAULT_MAX_COLLABORATORS),
        Some(n) if n < 0 => Err(ApiError::validation("maxCollaborators must be at least 1")),
        Some(n) => u32::try_from(n)
            .map_err(|_| ApiError::validation("maxCollaborators is too large")),
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiError::validation(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Creates an active session owned by `owner_id` under a fresh join code.
///
/// # Errors
///
/// - [`ApiError::Validation`] for a blank name or invalid capacity
/// - [`ApiError::Internal`] if no unique code could be committed, or on
///   storage failure
pub async fn create_session(
    store: &dyn CredentialStore,
    codes: &CodeAllocator,
    owner_id: Uuid,
    request: CreateSessionRequest,
) -> Result<SessionRecord> {
    validate_name(&request.name)?;
    let max_collaborators = resolve_capacity(request.max_collaborators)?;

    for attempt in 1..=MAX_INSERT_ATTEMPTS {
        let code = codes.allocate(store).await?;
        let new_session = NewSession {
            code,
            name: request.name.clone(),
            owner_id: Some(owner_id),
            max_collaborators,
            status: SessionStatus::Active,
        };

        match store.insert_session(new_session).await {
            Ok(record) => {
                info!(
                    session_id = %record.id,
                    owner_id = %owner_id,
                    max_collaborators,
                    "Session created"
                );
                return Ok(record);
            }
            Err(StoreError::Conflict(_)) => {
                debug!(attempt, "Join code taken at insert, reallocating");
            }
            Err(err) => return Err(err.into()),
        }
    }

    warn!(
        attempts = MAX_INSERT_ATTEMPTS,
        "Gave up committing a unique join code"
    );
    Err(InternalError::CodeExhausted {
        attempts: MAX_INSERT_ATTEMPTS,
    }
    .into())
}

/// Sessions owned by `owner_id`, newest first.
pub async fn list_sessions(store: &dyn CredentialStore, owner_id: Uuid) -> Result<Vec<SessionRecord>> {
    let sessions = store.list_sessions_by_owner(owner_id).await?;
    debug!(owner_id = %owner_id, count = sessions.len(), "Listed sessions");
    Ok(sessions)
}

/// Looks up a session by join code. Codes are matched case-insensitively by
/// upper-casing the input, since issued codes are always upper case.
pub async fn join_session(store: &dyn CredentialStore, code: &str) -> Result<SessionRecord> {
    let code = code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(ApiError::validation("missing code"));
    }

    store
        .get_session_by_code(&code)
        .await?
        .ok_or(ApiError::NotFound("session"))
}
