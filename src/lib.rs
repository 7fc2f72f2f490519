//! Prewarm library
//!
//! Keeps an LLM inference server's prefix cache warm for a live codebase:
//! eligible files are fingerprinted, tracked, and sent as low-cost priming
//! requests whenever their content changes.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod server;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
pub use scheduler::{LifecycleState, PipelineHandle, Scheduler, StatusReport};
