//! HTTP/WebSocket server for browser access to Parley.
//!
//! Exposes the session registry over `/ws/chat` plus a small REST surface,
//! and optionally serves the static UI bundle.

mod routes;
mod state;
mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub use state::SharedState;

/// Handle to a running HTTP server.
pub struct HttpServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl HttpServerHandle {
    /// Check if the server has not been stopped yet.
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Stop the server gracefully and wait for it to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Start the HTTP server on the given host and port.
///
/// Returns once the listener is bound; the server itself runs as a
/// background task until the returned handle is stopped.
pub async fn start(
    state: Arc<SharedState>,
    host: &str,
    port: u16,
    static_dir: Option<String>,
) -> Result<HttpServerHandle, String> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let mut app = Router::new()
        .route("/api/sessions", get(routes::list_sessions_handler))
        .route("/api/sessions/interrupt", post(routes::interrupt_handler))
        .route("/ws/chat", get(websocket::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;

    log::info!("HTTP server listening on http://{}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
                log::info!("HTTP server shutting down");
            })
            .await
            .ok();
    });

    Ok(HttpServerHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::meta::FileMetadataStore;
    use parley_core::runtime::{EventReceiver, RuntimeError, RuntimeRequest};
    use parley_core::{AgentRuntime, RegistryConfig, SessionRegistry};
    use tokio::sync::mpsc;

    struct IdleRuntime;

    impl AgentRuntime for IdleRuntime {
        fn start(&self, _request: RuntimeRequest) -> Result<EventReceiver, RuntimeError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    fn make_state(root: &std::path::Path) -> Arc<SharedState> {
        let registry = Arc::new(SessionRegistry::new(
            RegistryConfig::new(root),
            Arc::new(IdleRuntime),
        ));
        let metadata = Arc::new(FileMetadataStore::new(root.join(".metadata")));
        Arc::new(SharedState::new(registry, metadata))
    }

    #[tokio::test]
    async fn start_binds_and_stops() {
        let root = tempfile::tempdir().unwrap();
        let state = make_state(root.path());

        let mut handle = start(state, "127.0.0.1", 0, None).await.unwrap();
        assert!(handle.is_running());

        handle.stop().await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn start_rejects_bad_address() {
        let root = tempfile::tempdir().unwrap();
        let state = make_state(root.path());
        assert!(start(state, "not an address", 0, None).await.is_err());
    }
}
