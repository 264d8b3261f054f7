//! Provider configuration

use std::time::Duration;

/// Default upper bound on waiting for a long-running operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Default delay between operation status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Long-running operations that do not finish within this time fail
    /// with a timeout error
    pub operation_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ProviderConfig {
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
