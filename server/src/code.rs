//! Join-code allocation.
//!
//! Join codes are short uppercase alphanumeric strings (`[A-Z0-9]`, six
//! characters by default) that people type to find a session. They are not
//! secrets and play no part in authorization, so a seeded PRNG is enough.
//!
//! The allocator owns one [`StdRng`] seeded from the OS when it is built and
//! shares it behind a mutex. Candidates are checked against the store and
//! retried a bounded number of times; the check is only a fast path, because
//! the store's unique constraint is what finally rejects a duplicate insert.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, warn};

use crate::store::{CredentialStore, StoreError};
use crate::types::CODE_LENGTH;

/// Symbols a join code is drawn from.
pub const CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Candidates tried by a single [`CodeAllocator::allocate`] call.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 5;

/// Errors from code allocation.
#[derive(Debug, Error)]
pub enum AllocError {
    /// Every candidate drawn was already taken.
    #[error("no free join code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: usize },

    /// The existence check failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Generates join codes that are unused at the time of the check.
#[derive(Debug)]
pub struct CodeAllocator {
    rng: Mutex<StdRng>,
}

impl Default for CodeAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeAllocator {
    /// Allocator seeded once from the operating system.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Allocator with a fixed seed, for reproducible tests.
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Draws one candidate of `length` symbols without consulting the store.
    pub fn candidate(&self, length: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..length)
            .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
            .collect()
    }

    /// Returns a code of [`CODE_LENGTH`] that no session currently holds.
    pub async fn allocate(&self, store: &dyn CredentialStore) -> Result<String, AllocError> {
        self.allocate_with_length(store, CODE_LENGTH).await
    }

    /// Like [`allocate`](Self::allocate) with a caller-chosen length.
    ///
    /// Tries at most [`MAX_ALLOCATION_ATTEMPTS`] candidates.
    pub async fn allocate_with_length(
        &self,
        store: &dyn CredentialStore,
        length: usize,
    ) -> Result<String, AllocError> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let code = self.candidate(length);
            if store.count_sessions_by_code(&code).await? == 0 {
                debug!(attempt, "Allocated join code");
                return Ok(code);
            }
            debug!(attempt, "Join code collision, retrying");
        }

        warn!(
            attempts = MAX_ALLOCATION_ATTEMPTS,
            "Join code allocation exhausted"
        );
        Err(AllocError::CodeGenerationExhausted {
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }
}

/// Returns true if `code` has the shape of a join code.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}
