//! Tandem Server - accounts, access tokens and join-code sessions.
//!
//! This crate provides the identity and session-issuance side of Tandem:
//! - Registering accounts with Argon2id password digests
//! - Logging in and issuing HS256 access tokens
//! - Gating protected routes on a verified token
//! - Creating collaborative sessions under short, typeable join codes
//!
//! # Architecture
//!
//! Handlers in [`routes`] parse requests and delegate to [`accounts`] and
//! [`sessions`], which talk to a [`store::CredentialStore`]. Uniqueness of
//! emails and join codes is enforced by the store itself; the service layer
//! only turns the resulting conflicts into client-facing answers.

pub mod accounts;
pub mod auth;
pub mod code;
pub mod config;
pub mod error;
pub mod password;
pub mod routes;
pub mod sessions;
pub mod store;
pub mod token;
pub mod types;
