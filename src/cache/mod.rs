//! Cache prepopulation.
//!
//! This module provides:
//! - Token estimation and context budgeting
//! - Priming request construction
//! - The inference server client
//! - The cache manager that queues, dedups and primes files

mod client;
mod manager;
mod request;
#[cfg(test)]
pub(crate) mod testing;
mod tokens;

pub use client::{BackendResult, HttpBackend, InferenceBackend, ModelInfo};
pub use manager::{
    CacheEntry, CacheManager, CacheState, CacheStats, CacheStatsSnapshot, PrimeOutcome,
};
pub use request::{ChatCompletionRequest, ChatMessage, PrimingPrompt, PRIMING_MAX_TOKENS};
pub use tokens::{
    estimate_tokens, TokenBudget, DEFAULT_CONTEXT_LEN, MESSAGE_RESERVE, RESPONSE_RESERVE,
};
