//! Web front-end for crewline.
//!
//! # Endpoints
//!
//! - `GET /` - Topic form
//! - `POST /kickoff` - Research and write an article on the submitted topic
//! - `GET /health` - Health check
//!
//! # Architecture
//!
//! ```text
//! Browser
//!    │  POST /kickoff  topic=...
//!    ▼
//! ┌─────────────────┐
//! │   Web server    │ ◄── This crate
//! │     (Axum)      │
//! └────────┬────────┘
//!          │ per-request crew
//!          ▼
//! ┌───────────────────┐      ┌──────────┐
//! │ Senior Researcher │ ───► │  Writer  │ ──► new-blog-post.md
//! └─────────┬─────────┘      └────┬─────┘
//!           └── shared LLM client and search tool
//! ```

pub mod blog;
pub mod config;
pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::{AppConfig, CrewSettings};
pub use state::AppState;

/// Create the router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/kickoff", post(routes::kickoff))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server on the given address.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let router = create_router(state);

    info!(%addr, "Starting crewline server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
