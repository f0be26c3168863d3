//! Configuration loading for the distance feed.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{FeedError, Result};

/// Default file name of the control channel inside the pipe directory.
pub const DEFAULT_CONTROL_FILE_NAME: &str = "distances.matrix";

/// Minimum number of samples written per channel before steady state.
pub const MIN_PRIME_COUNT: usize = 2;

/// Tunables for the pipe registry and the delivery pool.
///
/// Every field has a default so an empty TOML file is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FeedConfig {
    /// Duration of one Position Source step in microseconds.
    pub step_us: u64,
    /// Upper bound on delivery worker threads.
    pub max_workers: usize,
    /// Fixed backoff between open/prime retries (ms).
    pub retry_delay_ms: u64,
    /// Sleep after a worker pass that wrote nothing (ms).
    pub idle_delay_ms: u64,
    /// Samples written synchronously per channel during startup.
    pub prime_count: usize,
    /// Kernel pipe buffer size applied to every data channel, if set.
    pub pipe_buffer_size: Option<usize>,
    /// Give up opening a channel after this many attempts. Absent means retry forever.
    pub open_attempts: Option<u32>,
    /// Directory for the FIFOs. Absent means a fresh temporary directory.
    pub pipe_dir: Option<PathBuf>,
    /// File name of the control channel.
    pub control_file_name: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            step_us: 1_000_000,
            max_workers: 10,
            retry_delay_ms: 100,
            idle_delay_ms: 100,
            prime_count: MIN_PRIME_COUNT,
            pipe_buffer_size: Some(4096),
            open_attempts: None,
            pipe_dir: None,
            control_file_name: DEFAULT_CONTROL_FILE_NAME.to_string(),
        }
    }
}

impl FeedConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `config_path` - Path to the config.toml file
    ///
    /// # Returns
    /// * `Ok(FeedConfig)` if the file was loaded, parsed and validated
    /// * `Err(FeedError::Config)` with a descriptive message otherwise
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path).map_err(|e| FeedError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: FeedConfig = toml::from_str(content).map_err(|e| FeedError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or divide the feed by zero.
    pub fn validate(&self) -> Result<()> {
        if self.step_us == 0 {
            return Err(FeedError::Config("step-us must be positive".to_string()));
        }
        if self.max_workers == 0 {
            return Err(FeedError::Config("max-workers must be positive".to_string()));
        }
        if self.control_file_name.is_empty() || self.control_file_name.contains('/') {
            return Err(FeedError::Config(format!("Invalid control-file-name {:?}", self.control_file_name)));
        }
        if self.pipe_buffer_size == Some(0) {
            return Err(FeedError::Config("pipe-buffer-size must be positive when set".to_string()));
        }
        Ok(())
    }

    /// Number of priming samples, never below the protocol minimum.
    pub fn effective_prime_count(&self) -> usize {
        self.prime_count.max(MIN_PRIME_COUNT)
    }

    /// Worker count for a run with `node_count` nodes.
    pub fn worker_count(&self, node_count: usize) -> usize {
        self.max_workers.min(node_count).max(1)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_millis(self.retry_delay_ms),
            max_attempts: self.open_attempts,
        }
    }
}

/// Fixed-delay retry policy used for channel open and priming.
///
/// There is no exponential growth: the feed is only useful once the
/// consumer is live, so retries keep a constant cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// `None` retries indefinitely.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever with the given delay.
    pub fn forever(delay: Duration) -> Self {
        Self { delay, max_attempts: None }
    }

    /// Whether another attempt is allowed after `attempts` failed ones.
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = FeedConfig::from_toml("").unwrap();
        assert_eq!(config.step_us, 1_000_000);
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.pipe_buffer_size, Some(4096));
        assert_eq!(config.open_attempts, None);
        assert_eq!(config.control_file_name, "distances.matrix");
    }

    #[test]
    fn kebab_case_keys_override_defaults() {
        let config = FeedConfig::from_toml(
            r#"
            step-us = 500000
            max-workers = 4
            retry-delay-ms = 5
            prime-count = 1
            open-attempts = 3
            pipe-dir = "/tmp/feed"
            "#,
        )
        .unwrap();
        assert_eq!(config.step_us, 500_000);
        assert_eq!(config.worker_count(100), 4);
        assert_eq!(config.worker_count(3), 3);
        assert_eq!(config.effective_prime_count(), 2);
        assert_eq!(config.pipe_dir, Some(PathBuf::from("/tmp/feed")));
        let policy = config.retry_policy();
        assert_eq!(policy.delay, Duration::from_millis(5));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }

    #[test]
    fn rejects_zero_step_and_workers() {
        assert!(matches!(FeedConfig::from_toml("step-us = 0"), Err(FeedError::Config(_))));
        assert!(matches!(FeedConfig::from_toml("max-workers = 0"), Err(FeedError::Config(_))));
        assert!(matches!(FeedConfig::from_toml("control-file-name = \"a/b\""), Err(FeedError::Config(_))));
    }

    #[test]
    fn unlimited_policy_always_allows() {
        let policy = RetryPolicy::forever(Duration::from_millis(1));
        assert!(policy.allows(u32::MAX));
    }
}
