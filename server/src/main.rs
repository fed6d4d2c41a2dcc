//! Tandem Server - Main entry point.
//!
//! This binary starts the Tandem server with:
//! - Structured JSON logging for production
//! - A SQLite credential store, schema created on startup
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//!
//! # Configuration
//!
//! See [`tandem_server::config`] for environment variable configuration.
//! A `.env` file in the working directory is loaded first if present.
//!
//! # Example
//!
//! ```bash
//! JWT_SECRET="change-me-to-something-long-and-random" \
//! DATABASE_URL="sqlite://tandem.db?mode=rwc" \
//! PORT=8080 \
//! cargo run --release --bin tandem-server
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use tandem_server::config::Config;
use tandem_server::routes::{create_router, AppState};
use tandem_server::store::SqlStore;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal in production.
    let dotenv = dotenvy::dotenv();

    init_logging();

    if let Err(err) = &dotenv {
        if !err.not_found() {
            warn!(error = %err, "Failed to read .env file");
        }
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables:");
            eprintln!("  JWT_SECRET           - Shared secret for signing access tokens");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  JWT_EXPIRES_H        - Access token lifetime in hours (default: 24)");
            eprintln!("  DATABASE_URL         - SQLite URL (default: sqlite://tandem.db?mode=rwc)");
            eprintln!("  PORT                 - HTTP server port (default: 8080)");
            eprintln!("  REQUEST_TIMEOUT_SECS - Per-request deadline (default: 30)");
            eprintln!("  RUST_LOG             - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    info!(
        port = config.port,
        token_ttl_hours = config.token_ttl_hours,
        request_timeout_secs = config.request_timeout.as_secs(),
        "Tandem server starting"
    );

    let store = match open_store(&config.database_url).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %format!("{err:#}"), "Failed to open credential store");
            return ExitCode::from(1);
        }
    };

    let state = AppState::new(config.clone(), Arc::new(store));
    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!(port = config.port, address = %bind_addr, "Server listening");
            listener
        }
        Err(err) => {
            error!(error = %err, address = %bind_addr, "Failed to bind to address");
            return ExitCode::from(1);
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    info!("Server ready to accept connections");

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Connects to the database; the schema is created if needed.
async fn open_store(database_url: &str) -> anyhow::Result<SqlStore> {
    SqlStore::connect(database_url)
        .await
        .with_context(|| format!("opening credential store at {database_url}"))
}

/// Initialize structured logging with tracing.
///
/// JSON output, filtered by `RUST_LOG` with a default of `info` plus request
/// traces from tower-http.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves when SIGINT (Ctrl+C) or SIGTERM is received.
///
/// axum stops accepting connections and lets in-flight requests finish.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
