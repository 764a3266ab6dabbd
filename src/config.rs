//! Client and pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one registry client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the registry API.
    pub base_url: String,
    /// User agent sent on every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Enforced minimum spacing between requests, per client.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Deadline for a single request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Fallback session lifetime when the server declares no expiry.
    #[serde(default = "default_session_max_age_secs")]
    pub session_max_age_secs: u64,
    /// Transient-failure retries per logical operation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Crash recoveries (session + identity respawns) per logical sequence.
    #[serde(default = "default_max_recoveries")]
    pub max_recoveries: u32,
    /// Base backoff delay for transient failures.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Cap on any single backoff delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; registry-harvest/0.3)".to_string()
}

fn default_min_interval_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_session_max_age_secs() -> u64 {
    20 * 60
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_recoveries() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

impl ClientConfig {
    /// Creates a configuration for the given base URL with defaults.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: default_user_agent(),
            min_interval_ms: default_min_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            session_max_age_secs: default_session_max_age_secs(),
            max_retries: default_max_retries(),
            max_recoveries: default_max_recoveries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }

    /// Sets the minimum inter-request spacing.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the transient retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the crash recovery budget.
    pub fn with_max_recoveries(mut self, max_recoveries: u32) -> Self {
        self.max_recoveries = max_recoveries;
        self
    }

    /// Sets the backoff window.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base_ms = base.as_millis() as u64;
        self.backoff_max_ms = max.as_millis() as u64;
        self
    }

    /// Minimum spacing as a `Duration`.
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Request deadline as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Session max age as a `Duration`.
    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }
}

/// Configuration for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of workers, each with its own session and network identity.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Interval at which submitters poll for an idle worker.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_concurrency() -> usize {
    3
}

fn default_poll_interval_ms() -> u64 {
    50
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl PoolConfig {
    /// Creates a pool configuration with the given concurrency.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }

    /// Sets the idle-worker poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
