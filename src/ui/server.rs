//! Axum web server
//!
//! | Path | Description |
//! |------|-------------|
//! | `/video.stream`, `/video.mjpeg` | Live MJPEG (`multipart/x-mixed-replace`) |
//! | `/audio.stream`, `/audio.raw` | Live raw PCM s16le |
//! | `/` | Status page |
//! | `/api/status` | JSON status |
//! | `/api/devices` | JSON list of audio inputs |

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::error::Result;
use crate::pipeline::Pipelines;
use crate::session::SessionRegistry;
use crate::shutdown::ShutdownSignal;
use crate::ui::handlers;

/// Shared state passed to all request handlers
pub struct AppState {
    pub config: AppConfig,
    pub pipelines: Pipelines,
    pub sessions: SessionRegistry,
    pub shutdown: ShutdownSignal,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, pipelines: Pipelines, shutdown: ShutdownSignal) -> Self {
        Self {
            config,
            pipelines,
            sessions: SessionRegistry::new(),
            shutdown,
            started_at: Utc::now(),
        }
    }
}

/// Build the router with all endpoints
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/video.stream", get(handlers::video_stream))
        .route("/video.mjpeg", get(handlers::video_stream))
        .route("/audio.stream", get(handlers::audio_stream))
        .route("/audio.raw", get(handlers::audio_stream))
        .route("/api/status", get(handlers::get_status))
        .route("/api/devices", get(handlers::get_devices))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP front end over the capture pipelines
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: AppConfig, pipelines: Pipelines, shutdown: ShutdownSignal) -> Self {
        Self {
            state: Arc::new(AppState::new(config, pipelines, shutdown)),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Serve until shutdown is triggered and open streams have drained.
    ///
    /// Connections still open `drain_timeout_ms` after shutdown (a client
    /// that stopped reading) are abandoned.
    pub async fn run(self) -> Result<()> {
        let server = &self.state.config.server;
        let addr = format!("{}:{}", server.bind_address, server.http_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Web UI available at http://{}", listener.local_addr()?);

        serve_until_shutdown(listener, self.state.clone()).await
    }
}

/// Serve `state` on `listener` until its shutdown signal has fired and
/// connections have drained, or the drain deadline has passed
pub async fn serve_until_shutdown(listener: tokio::net::TcpListener, state: Arc<AppState>) -> Result<()> {
    let poll = Duration::from_millis(state.config.server.shutdown_poll_ms);
    let drain = Duration::from_millis(state.config.server.drain_timeout_ms);

    let signal = state.shutdown.clone();
    let serve = axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(async move { signal.wait(poll).await })
        .into_future();

    let signal = state.shutdown.clone();
    let deadline = async move {
        signal.wait(poll).await;
        tokio::time::sleep(drain).await;
    };

    tokio::select! {
        result = serve => result?,
        _ = deadline => {
            tracing::warn!(
                sessions = state.sessions.len(),
                "Connections still open {:?} after shutdown; closing anyway",
                drain
            );
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}
