//! HTTP stats API.
//!
//! A small read-only REST surface for external monitoring of the miner,
//! built on Axum. Exposes device status and global share statistics; it is
//! only started when a listen address is configured.

pub mod v1;

pub use v1::AppState;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Serve the API until the shutdown token fires.
pub async fn serve(listen: &str, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new()
        .nest("/api/v1", v1::routes(state))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| Error::Api(format!("cannot bind stats endpoint on {listen}: {e}")))?;
    info!(listen = %listen, "Stats endpoint available");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Api(e.to_string()))
}
