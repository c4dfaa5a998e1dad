//! HTTP surface and review orchestration.
//!
//! `POST /webhook` receives GitLab push / merge-request events, answers
//! immediately, and runs the review on a background task under the
//! project lock. `GET /health` is a plain liveness probe.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use thiserror::Error;
use tokio::signal;
use tracing::info;

pub mod core;
pub mod review;
pub mod routes;

use crate::core::app_state::{AppConfig, AppState};
use crate::routes::health_route::health_route;
use crate::routes::webhook::webhook_route::webhook_route;

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Client(#[from] gitlab_client::GitLabClientError),

    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),

    #[error("server error")]
    Server(#[source] std::io::Error),
}

pub async fn start(config: AppConfig) -> Result<(), StartError> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config)?);

    let app = Router::new()
        .route("/webhook", post(webhook_route))
        .route("/health", get(health_route))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(StartError::Bind)?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartError::Server)?;

    Ok(())
}

/// Returns a future that resolves when Ctrl+C is pressed
async fn shutdown_signal() {
    signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
}
