//! # Smart Logging Demo Server
//!
//! Small axum server showing the logging layer on a handful of routes:
//!
//! - `GET /ok`: fast success, silent unless the threshold is `0`
//! - `GET /slow`: sleeps past the default threshold, logged with a `SLOW` tag
//! - `GET /error`: handler failure, logged in red with its cause chain
//! - `GET /not-found`: plain 404, logged with its body
//! - `GET /health`: hidden by a custom filter
//!
//! Options come from the file named by `SMART_LOGGING_CONFIG` (YAML or JSON),
//! otherwise from defaults plus `SMART_LOGGING_*` environment overrides.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::signal;
use tracing::{info, warn};

use smart_logging::observability::{init_logging, LogConfig};
use smart_logging::{ActionPatch, HandlerError, LogContext, LoggingOptions, SmartLoggingLayer};

const CONFIG_PATH_ENV: &str = "SMART_LOGGING_CONFIG";
const DEFAULT_PORT: u16 = 3000;
const SLOW_ROUTE_DELAY: Duration = Duration::from_millis(1500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(&LogConfig::from_env());

    let options = load_options().await?;
    info!(options = ?options, "Smart logging configured");

    let options = options.with_filter(|ctx: &LogContext| (ctx.url() == "/health").then(ActionPatch::hide));
    let app = build_router(SmartLoggingLayer::new(options));

    let port = match std::env::var("PORT") {
        Ok(port) => port.parse().context("PORT must be a valid port number")?,
        Err(_) => DEFAULT_PORT,
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Demo server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Demo server shutdown complete");
    Ok(())
}

async fn load_options() -> anyhow::Result<LoggingOptions> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => LoggingOptions::load_from_file(&path)
            .await
            .with_context(|| format!("Failed to load logging options from {}", path)),
        Err(_) => {
            let mut options = LoggingOptions::default();
            options.apply_env_overrides()?;
            Ok(options)
        }
    }
}

fn build_router(layer: SmartLoggingLayer) -> Router {
    Router::new()
        .route("/ok", get(ok))
        .route("/slow", get(slow))
        .route("/error", get(fail))
        .route("/not-found", get(not_found))
        .route("/health", get(health))
        .layer(layer)
}

async fn ok() -> &'static str {
    "ok"
}

async fn slow() -> &'static str {
    tokio::time::sleep(SLOW_ROUTE_DELAY).await;
    "finally"
}

async fn fail() -> Result<String, HandlerError> {
    let port: u16 = "not-a-port"
        .parse()
        .context("Failed to read upstream port")?;
    Ok(format!("upstream on port {}", port))
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "no such thing")
}

async fn health() -> &'static str {
    "healthy"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
