//! HTTP front end for agent hook callbacks.

pub mod hooks;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::state::AppState;
use crate::{AppError, Result};

/// Build the hook callback router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/hooks/approval", post(hooks::handle_approval))
        .route("/hooks/question", post(hooks::handle_question))
        .with_state(state)
}

/// Bind the hook server and serve it until the token fires.
///
/// Returns the join handle and the bound address (useful with port 0).
///
/// # Errors
///
/// Returns `AppError::Http` if the port cannot be bound.
pub async fn spawn_server(
    state: Arc<AppState>,
    port: u16,
    cancel: CancellationToken,
) -> Result<(JoinHandle<()>, std::net::SocketAddr)> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|err| AppError::Http(format!("failed to bind hook port {port}: {err}")))?;
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::Http(format!("failed to read bound address: {err}")))?;
    info!(%addr, "hook callback server listening");

    let app = router(state);
    let handle = tokio::spawn(async move {
        let shutdown = async move { cancel.cancelled().await };
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(%err, "hook server failed");
        }
        info!("hook server exited");
    });
    Ok((handle, addr))
}
