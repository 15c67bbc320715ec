//! API server lifecycle: bind → spawn background task → return handle
//! with shutdown channel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::api_router;
use crate::core_state::CoreState;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Handle to a running API server.
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), std::io::Error>>,
}

impl ApiServer {
    /// Signal graceful shutdown. In-flight requests are allowed to finish.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Wait for the server task to exit.
    pub async fn wait(self) -> Result<(), ServerError> {
        self.task.await??;
        Ok(())
    }
}

/// Bind `addr` and serve the API router in a background task.
pub async fn start_api_server(
    core: Arc<CoreState>,
    addr: SocketAddr,
) -> Result<ApiServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr()?;

    let app = api_router(core);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await;
        if let Err(e) = &result {
            tracing::error!("API server error: {e}");
        }
        tracing::info!("API server stopped");
        result
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

/// Serve until Ctrl-C, then shut down gracefully.
pub async fn serve_until_ctrl_c(core: Arc<CoreState>, addr: SocketAddr) -> Result<(), ServerError> {
    let mut server = start_api_server(core, addr).await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl-C received"),
        Err(e) => tracing::error!("Failed to listen for Ctrl-C: {e}"),
    }

    server.shutdown();
    server.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    fn empty_core() -> Arc<CoreState> {
        Arc::new(CoreState::new(AppConfig::default(), None, None))
    }

    #[tokio::test]
    async fn server_starts_on_ephemeral_port() {
        let mut server = start_api_server(empty_core(), loopback()).await.unwrap();
        assert_ne!(server.addr.port(), 0);
        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn server_serves_health() {
        let mut server = start_api_server(empty_core(), loopback()).await.unwrap();

        let url = format!("http://{}/api/health", server.addr);
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 200);

        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["classifier_loaded"], false);

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let mut first = start_api_server(empty_core(), loopback()).await.unwrap();
        let err = start_api_server(empty_core(), first.addr).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
        first.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let mut server = start_api_server(empty_core(), loopback()).await.unwrap();
        server.shutdown();
        server.shutdown();
        server.wait().await.unwrap();
    }
}
