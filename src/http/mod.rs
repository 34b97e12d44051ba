//! HTTP surface: the terminal WebSocket endpoint and the SFTP routes

mod response;
mod sftp;
mod ws;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::Response;
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use response::{ApiError, ApiResponse, ErrorBody, ok, status_for};

use crate::error::Result;
use crate::files::SftpBridge;
use crate::ports::SshConnector;
use crate::relay::TerminalService;
use crate::security::TokenVerifier;

/// Shared handles for every request
pub struct AppState<C: SshConnector> {
    pub terminal: Arc<TerminalService<C>>,
    pub files: Arc<SftpBridge<C>>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl<C: SshConnector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            terminal: Arc::clone(&self.terminal),
            files: Arc::clone(&self.files),
            verifier: Arc::clone(&self.verifier),
        }
    }
}

impl<C: SshConnector> AppState<C> {
    /// Check the bearer token from the `Authorization` header, falling back
    /// to the `token` query parameter.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` when the token is missing or rejected.
    pub fn authorize(&self, headers: &HeaderMap, query_token: Option<&str>) -> Result<()> {
        self.verifier
            .verify(bearer_token(headers).or(query_token))
    }
}

/// Token from `Authorization: Bearer <token>`
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then_some(token.trim())
        .filter(|t| !t.is_empty())
}

async fn health() -> Response {
    ok("ok")
}

/// Build the application router.
pub fn router<C: SshConnector>(state: AppState<C>, max_upload_bytes: usize) -> Router {
    let sftp = Router::new()
        .route("/:host_id/list", get(sftp::list::<C>))
        .route(
            "/:host_id/upload",
            post(sftp::upload::<C>).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/:host_id/download", get(sftp::download::<C>))
        .route("/:host_id/delete", delete(sftp::remove::<C>))
        .route("/:host_id/mkdir", post(sftp::mkdir::<C>))
        .route("/:host_id/rename", post(sftp::rename::<C>));

    Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/cmdb/ws/ssh", get(ws::terminal::<C>))
        .nest("/api/v1/cmdb/sftp", sftp)
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns `Io` if the listener fails.
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "HTTP server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}
