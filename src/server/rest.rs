//! Status endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;

use crate::scheduler::{LifecycleState, PipelineHandle};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub state: LifecycleState,
    pub version: &'static str,
}

/// Create the status router.
pub fn create_status_router(handle: PipelineHandle) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(handle)
}

/// Health check endpoint.
///
/// Healthy only while watching; every other lifecycle state reports 503 so
/// orchestrators hold traffic until the initial scan is done.
async fn health_check(State(handle): State<PipelineHandle>) -> impl IntoResponse {
    let state = handle.state();
    let (status_code, status) = if state == LifecycleState::Watching {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    tracing::debug!(status = ?status_code, state = state.as_str(), "Health check");

    (
        status_code,
        Json(HealthResponse {
            status,
            state,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Pipeline status as JSON.
async fn status(State(handle): State<PipelineHandle>) -> impl IntoResponse {
    Json(handle.report())
}

/// Prometheus metrics endpoint.
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                b"Failed to encode metrics".to_vec(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::RecordingBackend;
    use crate::config::Config;
    use crate::scheduler::Scheduler;
    use crate::server::init_metrics;
    use crate::watcher::{EligibilityFilter, GitignoreOracle};
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn create_test_handle(tmp: &TempDir) -> PipelineHandle {
        let config = Config {
            watch_dir: tmp.path().to_path_buf(),
            ..Config::default()
        };
        let filter = EligibilityFilter::new(&[], GitignoreOracle::load(tmp.path(), ".gitignore"));
        Scheduler::new(&config, RecordingBackend::new("qwen", 8192), filter).handle()
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_before_watching() {
        let tmp = TempDir::new().unwrap();
        let app = create_status_router(create_test_handle(&tmp));

        let response = get(app, "/health").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status() {
        let tmp = TempDir::new().unwrap();
        let app = create_status_router(create_test_handle(&tmp));

        let response = get(app, "/status").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["state"], "starting");
        assert_eq!(json["queue_len"], 0);
    }

    #[tokio::test]
    async fn test_metrics() {
        init_metrics();
        let tmp = TempDir::new().unwrap();
        let app = create_status_router(create_test_handle(&tmp));

        let response = get(app, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
