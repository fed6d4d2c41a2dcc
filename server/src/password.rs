//! Password hashing and verification.
//!
//! Passwords are hashed with Argon2id using a random per-password salt and a
//! fixed work factor (the argon2 crate's recommended parameters). Digests are
//! stored as PHC strings, so the parameters and salt travel with the hash.
//!
//! Both hashing and verification are deliberately expensive. Async callers
//! should go through [`hash_blocking`] and [`verify_blocking`], which move the
//! work onto tokio's blocking pool instead of stalling a runtime worker.
//!
//! Plaintext passwords are never logged.

use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;
use tokio::task::JoinError;

/// Errors that can occur while hashing a password.
#[derive(Debug, Error)]
pub enum PasswordError {
    /// The hasher rejected the input or its parameters.
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),

    /// The blocking task running the hash panicked or was cancelled.
    #[error("password hashing task failed: {0}")]
    Task(#[from] JoinError),
}

fn hasher() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
}

/// Hashes `plaintext` into a PHC-format Argon2id digest.
///
/// # Example
///
/// ```rust
/// use tandem_server::password::{hash, verify};
///
/// let digest = hash("correct horse").unwrap();
/// assert!(digest.starts_with("$argon2id$"));
/// assert!(verify("correct horse", &digest));
/// ```
pub fn hash(plaintext: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|digest| digest.to_string())
        .map_err(PasswordError::Hash)
}

/// Checks `plaintext` against a stored digest.
///
/// A malformed digest verifies as `false`, the same as a wrong password.
pub fn verify(plaintext: &str, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    hasher()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

/// Burns the same amount of work as a real verification.
///
/// Used when the account does not exist, so that response timing does not
/// reveal whether an email is registered.
pub fn verify_dummy(plaintext: &str) {
    static DUMMY_DIGEST: OnceLock<Option<String>> = OnceLock::new();
    let digest = DUMMY_DIGEST.get_or_init(|| hash("tandem-dummy-password").ok());
    if let Some(digest) = digest {
        let _ = verify(plaintext, digest);
    }
}

/// [`hash`] on the blocking pool.
pub async fn hash_blocking(plaintext: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash(&plaintext)).await?
}

/// [`verify`] on the blocking pool. `None` as the digest runs [`verify_dummy`]
/// and always yields `false`.
pub async fn verify_blocking(
    plaintext: String,
    digest: Option<String>,
) -> Result<bool, PasswordError> {
    let matched = tokio::task::spawn_blocking(move || match digest {
        Some(digest) => verify(&plaintext, &digest),
        None => {
            verify_dummy(&plaintext);
            false
        }
    })
    .await?;
    Ok(matched)
}
