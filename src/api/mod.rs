//! HTTP API server for the presence service

pub mod health;
pub mod websocket;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::presence::PresenceTracker;
use crate::Result;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub tracker: Arc<PresenceTracker>,
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    // CORS layer for cross-origin requests from the bot display
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(websocket::router(state.clone()))
        .merge(health::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
}

impl ApiServer {
    /// Create a server exposing `tracker`
    #[must_use]
    pub fn new(tracker: Arc<PresenceTracker>, host: impl Into<String>, port: u16) -> Self {
        Self {
            state: Arc::new(ApiState { tracker }),
            host: host.into(),
            port,
        }
    }

    /// Run the API server until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Server(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(%addr, "API server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::Error::Server(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn<F>(self, shutdown: F) -> tokio::task::JoinHandle<Result<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move { self.run_until(shutdown).await })
    }
}
