//! Runtime configuration.

use intellihouse_common::RpcConst;
use std::time::Duration;

/// Role a process plays in the RPC topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMode {
    /// Calls out to servers and answers inverse requests by polling
    Client,
    /// Answers direct requests and queues inverse requests for pollers
    Server,
    /// Both roles at once
    Both,
}

impl RpcMode {
    pub fn is_client(self) -> bool {
        matches!(self, RpcMode::Client | RpcMode::Both)
    }

    pub fn is_server(self) -> bool {
        matches!(self, RpcMode::Server | RpcMode::Both)
    }
}

/// Timeouts and pacing of one [`RpcContext`](crate::RpcContext).
///
/// # Default Configuration
///
/// - `default_timeout`: 90 s
/// - `transport_timeout`: 60 s (long-polls wait 90% of it)
/// - `poll_retry_delay`: 5 s
/// - `defer_threshold`: 30 s
///
/// # Example
///
/// ```
/// use intellihouse_rpc::RpcConfig;
/// use std::time::Duration;
///
/// let config = RpcConfig::default().with_transport_timeout(Duration::from_secs(10));
/// assert_eq!(config.poll_budget(), Duration::from_secs(9));
/// ```
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Timeout of requests that carry none
    pub default_timeout: Duration,
    /// Low-level timeout of one transport round trip
    pub transport_timeout: Duration,
    /// Pause after a failed poll
    pub poll_retry_delay: Duration,
    /// Expected processing time from which services defer their response
    pub defer_threshold: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            default_timeout: RpcConst::DEFAULT_TIMEOUT,
            transport_timeout: RpcConst::TRANSPORT_TIMEOUT,
            poll_retry_delay: RpcConst::POLL_RETRY_DELAY,
            defer_threshold: RpcConst::DEFER_THRESHOLD,
        }
    }
}

impl RpcConfig {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = timeout;
        self
    }

    pub fn with_poll_retry_delay(mut self, delay: Duration) -> Self {
        self.poll_retry_delay = delay;
        self
    }

    pub fn with_defer_threshold(mut self, threshold: Duration) -> Self {
        self.defer_threshold = threshold;
        self
    }

    /// Time a long-poll may block before answering empty-handed.
    pub fn poll_budget(&self) -> Duration {
        RpcConst::poll_budget(self.transport_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RpcConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(90));
        assert_eq!(config.transport_timeout, Duration::from_secs(60));
        assert_eq!(config.poll_budget(), Duration::from_secs(54));
    }

    #[test]
    fn test_mode_roles() {
        assert!(RpcMode::Client.is_client());
        assert!(!RpcMode::Client.is_server());
        assert!(RpcMode::Server.is_server());
        assert!(!RpcMode::Server.is_client());
        assert!(RpcMode::Both.is_client() && RpcMode::Both.is_server());
    }
}
