//! Structured logging configuration.
//!
//! Sets up the `tracing` subscriber with a configurable level and an
//! optional JSON output format. `RUST_LOG`, when set, takes precedence
//! over the configured level.

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing with the given level and output format.
///
/// # Panics
///
/// Panics if a tracing subscriber has already been initialized in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer().with_target(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Spans wrapping the long-running pipeline stages.
pub mod spans {
    use tracing::{info_span, Span};

    /// Span for one pass over the watched tree.
    #[must_use]
    pub fn scan_span(root: &str) -> Span {
        info_span!("initial_scan", root = %root)
    }

    /// Span for handling a single filesystem event.
    #[must_use]
    pub fn event_span(kind: &str, path: &str) -> Span {
        info_span!("file_event", kind = %kind, path = %path)
    }
}
