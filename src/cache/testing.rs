//! In-process inference backend for tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::client::{BackendResult, InferenceBackend, ModelInfo};
use super::request::ChatCompletionRequest;
use crate::error::BackendError;
use crate::watcher::{EligibilityFilter, FileRecord, FileSnapshot, Fingerprint};

/// Backend that records every completion request it receives.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    healthy: AtomicBool,
    failing: AtomicBool,
    health_checks: AtomicUsize,
    model: Mutex<Option<ModelInfo>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
    held: Mutex<Option<Arc<Notify>>>,
}

impl RecordingBackend {
    pub fn new(model: &str, max_model_len: usize) -> Arc<Self> {
        let backend = Self::default();
        backend.healthy.store(true, Ordering::SeqCst);
        backend.set_model(Some((model, max_model_len)));
        Arc::new(backend)
    }

    pub fn without_model() -> Arc<Self> {
        let backend = Self::default();
        backend.healthy.store(true, Ordering::SeqCst);
        Arc::new(backend)
    }

    pub fn set_model(&self, model: Option<(&str, usize)>) {
        *self.model.lock() = model.map(|(id, max_model_len)| ModelInfo {
            id: id.to_string(),
            max_model_len,
        });
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make the next completion wait until the returned gate is notified.
    pub fn hold_next(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.held.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Paths named in the recorded requests, in send order.
    pub fn primed_paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| {
                let system = &r.messages.first()?.content;
                let rest = system.strip_prefix("You are analyzing the file: ")?;
                Some(rest.lines().next()?.to_string())
            })
            .collect()
    }
}

#[async_trait]
impl InferenceBackend for RecordingBackend {
    async fn health(&self) -> bool {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        self.healthy.load(Ordering::SeqCst)
    }

    async fn model_info(&self) -> BackendResult<Option<ModelInfo>> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("connection refused".to_string()));
        }
        Ok(self.model.lock().clone())
    }

    async fn complete(&self, request: &ChatCompletionRequest) -> BackendResult<()> {
        let gate = self.held.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::status("/v1/chat/completions", 500));
        }
        self.requests.lock().push(request.clone());
        Ok(())
    }
}

/// Build a snapshot directly from content.
pub fn snapshot(path: &str, content: &str) -> FileSnapshot {
    FileSnapshot {
        record: FileRecord {
            path: path.to_string(),
            fingerprint: Fingerprint::of(content.as_bytes()),
            language: EligibilityFilter::detect_language(Path::new(path)),
        },
        content: content.to_string(),
    }
}
