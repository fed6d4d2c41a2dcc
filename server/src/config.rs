//! Server configuration module.
//!
//! Parses configuration from environment variables for the Tandem server.
//! `main` loads a `.env` file (if present) before calling [`Config::from_env`].
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `JWT_SECRET` | Yes | - | Shared HS256 signing secret |
//! | `JWT_EXPIRES_H` | No | 24 | Access token lifetime in hours (at most 8760) |
//! | `DATABASE_URL` | No | `sqlite://tandem.db?mode=rwc` | SQLite database URL |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `REQUEST_TIMEOUT_SECS` | No | 30 | Per-request deadline |

use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default access token lifetime in hours.
const DEFAULT_TOKEN_TTL_HOURS: u32 = 24;

/// Longest accepted access token lifetime (one year).
const MAX_TOKEN_TTL_HOURS: u32 = 24 * 365;

/// Default database location.
const DEFAULT_DATABASE_URL: &str = "sqlite://tandem.db?mode=rwc";

/// Default per-request deadline in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Secrets shorter than this are accepted with a warning.
const MIN_RECOMMENDED_SECRET_LEN: usize = 32;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Server configuration parsed from environment variables.
#[derive(Clone)]
pub struct Config {
    /// HS256 signing secret for access tokens.
    pub jwt_secret: String,

    /// Access token lifetime in hours.
    pub token_ttl_hours: u32,

    /// sqlx connection URL for the credential store.
    pub database_url: String,

    /// HTTP server port.
    pub port: u16,

    /// Deadline applied to each request at the transport boundary.
    pub request_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("database_url", &self.database_url)
            .field("port", &self.port)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Config {
    /// Builds a configuration with defaults for everything but the secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: DEFAULT_PORT,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `JWT_SECRET` is missing or empty
    /// - `JWT_EXPIRES_H` or `REQUEST_TIMEOUT_SECS` is not a positive integer
    /// - `JWT_EXPIRES_H` is more than a year
    /// - `PORT` is not a valid u16
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tandem_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = parse_secret()?;
        let token_ttl_hours = parse_positive("JWT_EXPIRES_H", DEFAULT_TOKEN_TTL_HOURS)?;
        if token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            return Err(ConfigError::InvalidFormat {
                var: "JWT_EXPIRES_H".to_string(),
                message: format!("must be at most {MAX_TOKEN_TTL_HOURS}, got {token_ttl_hours}"),
            });
        }
        let request_timeout_secs =
            parse_positive("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let database_url = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => DEFAULT_DATABASE_URL.to_string(),
        };
        let port = parse_port()?;

        if jwt_secret.len() < MIN_RECOMMENDED_SECRET_LEN {
            warn!(
                min_len = MIN_RECOMMENDED_SECRET_LEN,
                "JWT_SECRET is shorter than recommended"
            );
        }

        Ok(Self {
            jwt_secret,
            token_ttl_hours,
            database_url,
            port,
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}

/// Parse the JWT_SECRET environment variable. Must be set and non-empty.
fn parse_secret() -> Result<String, ConfigError> {
    match env::var("JWT_SECRET") {
        Ok(secret) if !secret.is_empty() => Ok(secret),
        Ok(_) => Err(ConfigError::InvalidFormat {
            var: "JWT_SECRET".to_string(),
            message: "cannot be empty".to_string(),
        }),
        Err(_) => Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string())),
    }
}

/// Parse a positive integer environment variable, falling back to `default`
/// when unset or empty.
fn parse_positive<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    let raw = match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(default),
    };

    match raw.trim().parse::<T>() {
        Ok(value) if value >= T::from(1) => Ok(value),
        _ => Err(ConfigError::InvalidFormat {
            var: name.to_string(),
            message: format!("expected a positive integer, got '{raw}'"),
        }),
    }
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}
