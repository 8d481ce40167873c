//! Presence Server - Main entry point.
//!
//! This binary starts the Presence status-aggregation service with:
//! - Structured JSON logging
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//!
//! # Configuration
//!
//! See [`presence_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! PRESENCE_SECRET_TOKEN="change-me" \
//! PRESENCE_DB_PATH=/var/lib/presence/presence.db \
//! PORT=8080 \
//! cargo run --release --bin presence-server
//! ```

use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use presence_server::config::Config;
use presence_server::routes::{create_router, AppState};
use presence_server::store::Store;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables:");
            eprintln!("  PRESENCE_SECRET_TOKEN           - Shared credential for reporters");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                            - HTTP server port (default: 8080)");
            eprintln!("  PRESENCE_DB_PATH                - SQLite file (default: presence.db)");
            eprintln!("  PRESENCE_ACTIVITY_OFFLINE_SECS  - Activity threshold (default: 15)");
            eprintln!("  PRESENCE_HEARTRATE_OFFLINE_SECS - Heart-rate threshold (default: 3600)");
            eprintln!("  PRESENCE_PHONE_OFFLINE_SECS     - Phone threshold (default: 900)");
            eprintln!("  RUST_LOG                        - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    info!(
        port = config.port,
        db_path = %config.db_path.display(),
        "Presence server starting"
    );

    let store = match Store::open(&config.db_path) {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "Failed to open channel store");
            return ExitCode::from(1);
        }
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let state = AppState::new(config, store);
    let app = create_router(state);

    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!(address = %bind_addr, "Server listening");
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

/// Initialize structured logging with tracing.
///
/// JSON-formatted output with environment-based level filtering via
/// `RUST_LOG`, defaulting to `info`.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

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

/// Creates a future that resolves when a shutdown signal is received.
///
/// Listens for SIGTERM (container orchestrator shutdown) and SIGINT
/// (Ctrl+C). axum's graceful shutdown then stops accepting connections and
/// lets in-flight requests complete; the store worker flushes and joins on
/// drop.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
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
