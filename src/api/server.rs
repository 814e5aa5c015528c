//! API server lifecycle: bind, spawn the axum server, stop it on signal.
//!
//! `start_api_server_on` returns a handle with a shutdown channel (used by
//! tests and embedders); `serve` runs in the foreground until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::api::router::api_router;
use crate::core_state::CoreState;

// ═══════════════════════════════════════════════════════════
// Public types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind API server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("API server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Where a running server listens.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub addr: SocketAddr,
    pub started_at: String,
}

/// Handle to a running API server.
pub struct ApiServer {
    pub info: ServerInfo,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ApiServer {
    pub fn port(&self) -> u16 {
        self.info.addr.port()
    }

    /// Shut down the server gracefully.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Server lifecycle
// ═══════════════════════════════════════════════════════════

async fn bind(addr: SocketAddr) -> Result<(tokio::net::TcpListener, SocketAddr), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let local = listener.local_addr()?;
    Ok((listener, local))
}

/// Start the API server in a background task. Port 0 picks an ephemeral port.
pub async fn start_api_server_on(
    core: Arc<CoreState>,
    addr: SocketAddr,
) -> Result<ApiServer, ServerError> {
    let (listener, addr) = bind(addr).await?;
    let app = api_router(core);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }
        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        info: ServerInfo {
            addr,
            started_at: chrono::Utc::now().to_rfc3339(),
        },
        shutdown_tx: Some(shutdown_tx),
    })
}

/// Serve in the foreground until Ctrl-C.
pub async fn serve(core: Arc<CoreState>, addr: SocketAddr) -> Result<(), ServerError> {
    let (listener, addr) = bind(addr).await?;
    tracing::info!(%addr, "Medicore API listening");

    axum::serve(listener, api_router(core))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {e}");
            }
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
