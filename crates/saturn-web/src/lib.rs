//! Saturn L2 Control Plane
//!
//! Local HTTP surface of the node:
//!
//! - `/config` - the public node configuration as JSON
//! - `/webui` - the dashboard, a single-page app with `index.html` fallback

pub mod assets;
pub mod handlers;
pub mod state;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use assets::{AssetStore, DirAssets, EmbeddedAssets};
pub use state::AppState;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Invalid asset path: {0}")]
    InvalidPath(String),

    #[error("Failed to read asset {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Create the control plane router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/config", get(handlers::config))
        .route("/config/*rest", get(handlers::config))
        .route("/webui", get(handlers::webui_root))
        .route("/webui/", get(handlers::webui_index))
        .route("/webui/*path", get(handlers::webui_asset))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the control plane listener on all interfaces
pub async fn bind(port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    Ok(listener)
}

/// Serve the control plane until `shutdown` is cancelled
pub async fn serve(
    state: Arc<AppState>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = create_router(state);

    tracing::info!("Control plane listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Control plane stopped");
    Ok(())
}
