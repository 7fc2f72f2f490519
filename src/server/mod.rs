//! Status server, metrics and logging setup.
//!
//! This module provides:
//! - Health, status and metrics endpoints using axum
//! - Prometheus metric definitions
//! - Tracing subscriber setup

mod app;
pub mod metrics;
pub mod observability;
mod rest;

pub use app::{shutdown_signal, StatusServer};
pub use metrics::init_metrics;
pub use observability::init_tracing;
pub use rest::{create_status_router, HealthResponse};
