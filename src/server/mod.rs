//! HTTP and WebSocket server
//!
//! Routes:
//! - `GET /ws` client event stream
//! - `GET /health` liveness
//! - `GET /api/poll` current poll snapshot
//! - `GET /metrics` Prometheus text format

pub mod ws;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::metrics::metrics_handler;
use crate::session::{Session, SessionSettings, SessionSnapshot};
use ws::Hub;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address {addr}: {message}")]
    InvalidAddress { addr: String, message: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub hub: Arc<Hub>,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let hub = Arc::new(Hub::new());
        let settings = SessionSettings {
            poll_timeout: config.poll.timeout(),
            min_options: config.poll.min_options,
        };
        let session = Session::new(hub.clone(), settings);
        Self {
            session,
            hub,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health_handler))
        .route("/api/poll", get(poll_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    ts: i64,
    uptime_ms: u64,
    version: &'static str,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        ts: chrono::Utc::now().timestamp_millis(),
        uptime_ms: state.start_time.elapsed().as_millis() as u64,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn poll_handler(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

/// Resolve the configured listen address.
pub fn listen_addr(config: &Config) -> Result<SocketAddr, ServerError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    addr.parse::<SocketAddr>()
        .map_err(|err| ServerError::InvalidAddress {
            addr,
            message: err.to_string(),
        })
}

/// Bind and serve until Ctrl-C or SIGTERM.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let addr = listen_addr(&config)?;
    let state = AppState::new(config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(address = %addr, "classpoll server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
