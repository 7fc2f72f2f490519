//! Status server and signal handling.

use std::net::SocketAddr;

use axum::Router;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::rest::create_status_router;
use crate::error::ServerError;
use crate::scheduler::PipelineHandle;
use crate::Result;

/// HTTP server exposing health, status and metrics.
pub struct StatusServer {
    listener: tokio::net::TcpListener,
    handle: PipelineHandle,
}

impl StatusServer {
    /// Bind the status server.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, handle: PipelineHandle) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            ServerError::BindFailed {
                address: addr.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self { listener, handle })
    }

    /// Address the server is listening on.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    fn router(&self) -> Router {
        create_status_router(self.handle.clone()).layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::debug_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(
                    |response: &axum::response::Response,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::debug!(
                            status = %response.status(),
                            latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                            "Request completed"
                        );
                    },
                ),
        )
    }

    /// Serve until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails while running.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let router = self.router();
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "Status server listening");
        }

        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| ServerError::Request(e.to_string()))?;

        tracing::info!("Status server shut down gracefully");
        Ok(())
    }
}

/// Wait for a shutdown signal (SIGTERM or Ctrl+C).
///
/// Returns immediately if the handlers cannot be installed, which starts
/// shutdown rather than leaving the process unstoppable.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
