use std::time::Duration;

use conflux_core::TimeoutMs;
use serde::{Deserialize, Serialize};

const DEFAULT_CONCURRENCY: usize = 20;
const DEFAULT_TIMEOUT_MS: TimeoutMs = 10_000;
const DEFAULT_TIMEOUT_MESSAGE: &str = "timed out";

/// Settings for [`ParallelQueue::run_with`](crate::ParallelQueue::run_with).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Number of worker loops. Zero is treated as one.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Deadline settings for [`ActionTimeout`](crate::ActionTimeout).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    pub timeout_ms: TimeoutMs,
    /// Text of the error reported when the deadline wins.
    #[serde(default = "default_timeout_message")]
    pub message: String,
}

impl TimeoutConfig {
    pub fn new(timeout_ms: TimeoutMs) -> Self {
        Self {
            timeout_ms,
            message: default_timeout_message(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS)
    }
}

/// Settings for [`SerialExecutor`](crate::SerialExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialConfig {
    /// Lane name recorded on the background loop's tracing span.
    pub name: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            name: "serial".to_string(),
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_timeout_message() -> String {
    DEFAULT_TIMEOUT_MESSAGE.to_string()
}
