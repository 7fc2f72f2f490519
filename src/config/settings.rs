//! Configuration settings and validation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Main configuration for the cache warmer.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the watched tree.
    pub watch_dir: PathBuf,

    /// Name of the ignore-rule file, resolved against `watch_dir`.
    pub ignore_file: String,

    /// Base URL of the inference server.
    pub endpoint: String,

    /// Interval between unconditional queue flushes.
    pub flush_interval: Duration,

    /// Queue length that triggers an immediate flush, and the flush drain limit.
    pub batch_size: usize,

    /// Largest file, in bytes, eligible for priming.
    pub max_file_size: u64,

    /// Extra directory names to ignore anywhere in the tree.
    pub extra_ignore_dirs: Vec<String>,

    /// Interval between readiness probes while waiting for the backend.
    pub health_poll_interval: Duration,

    /// Timeout for a single priming request.
    pub request_timeout: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// Address for the status/metrics endpoint, disabled when `None`.
    pub status_addr: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("/workspace"),
            ignore_file: ".gitignore".to_string(),
            endpoint: "http://vllm:8000".to_string(),
            flush_interval: Duration::from_secs(5),
            batch_size: 5,
            max_file_size: 100_000,
            extra_ignore_dirs: Vec::new(),
            health_poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            log_level: "info".to_string(),
            log_json: false,
            status_addr: None,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size cannot be 0"));
        }

        if self.max_file_size == 0 {
            return Err(Error::config("max_file_size cannot be 0"));
        }

        if self.flush_interval.is_zero() {
            return Err(Error::config("flush_interval cannot be 0"));
        }

        if self.health_poll_interval.is_zero() {
            return Err(Error::config("health_poll_interval cannot be 0"));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout cannot be 0"));
        }

        if self.ignore_file.is_empty() {
            return Err(Error::config("ignore_file cannot be empty"));
        }

        let url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| Error::config(format!("invalid endpoint '{}': {e}", self.endpoint)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "endpoint '{}' must use http or https",
                self.endpoint
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Endpoint with any trailing slash removed, ready for path joining.
    #[must_use]
    pub fn endpoint_base(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    /// Absolute path of the ignore-rule file.
    #[must_use]
    pub fn ignore_path(&self) -> PathBuf {
        self.watch_dir.join(&self.ignore_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_file_size, 100_000);
        assert_eq!(config.flush_interval, Duration::from_secs(5));
        assert!(config.status_addr.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let config = Config {
            batch_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_validate_zero_flush_interval() {
        let config = Config {
            flush_interval: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("flush_interval"));
    }

    #[test]
    fn test_validate_zero_max_file_size() {
        let config = Config {
            max_file_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_file_size"));
    }

    #[test]
    fn test_validate_bad_endpoint() {
        let config = Config {
            endpoint: "not a url".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid endpoint"));

        let config = Config {
            endpoint: "ftp://vllm:8000".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "invalid".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_log_level_case_insensitive() {
        for level in ["TRACE", "Debug", "INFO", "Warn", "ERROR"] {
            let config = Config {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Level '{level}' should be valid (case insensitive)"
            );
        }
    }

    #[test]
    fn test_endpoint_base_trims_slash() {
        let config = Config {
            endpoint: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.endpoint_base(), "http://localhost:8000");
    }

    #[test]
    fn test_ignore_path() {
        let config = Config {
            watch_dir: PathBuf::from("/srv/code"),
            ignore_file: ".prewarmignore".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.ignore_path(),
            PathBuf::from("/srv/code/.prewarmignore")
        );
    }
}
