use crate::config::types::IngestorConfig;
use crate::ingest::api::{upload, IngestState};
use axum::{extract::DefaultBodyLimit, routing::post, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

pub fn router(state: Arc<IngestState>) -> Router {
    let body_limit = state.max_body_bytes;
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves on an already bound listener until `shutdown` turns true.
pub async fn serve(
    listener: TcpListener,
    state: Arc<IngestState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), IngestError> {
    let app = router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.wait_for(|&v| v).await;
        info!("Ingest server shutting down gracefully");
    })
    .await?;

    Ok(())
}

/// Start the ingest HTTP server
pub async fn start_server(
    config: &IngestorConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<(), IngestError> {
    let listener = TcpListener::bind(&config.listen)
        .await
        .map_err(|source| IngestError::Bind {
            addr: config.listen.clone(),
            source,
        })?;

    info!(
        addr = %config.listen,
        base_dir = %config.base_dir.display(),
        "Starting ingest HTTP server"
    );

    serve(listener, Arc::new(IngestState::from_config(config)), shutdown).await
}
