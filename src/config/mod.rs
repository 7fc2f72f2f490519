//! Configuration management for prewarm.
//!
//! Configuration is built once at startup from command-line arguments,
//! each of which can also be supplied as an environment variable, and is
//! then passed by value into the scheduler.

mod settings;

pub use settings::Config;
