//! Protocol-wide constants.

use std::time::Duration;

/// Constants shared by clients and servers.
pub struct RpcConst;

impl RpcConst {
    /// Timeout applied when a request carries `timeout_ms == 0`.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

    /// Low-level timeout of a single transport round trip (one HTTP POST).
    pub const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Share of the transport timeout a long-poll may block for, in percent.
    ///
    /// The remainder is headroom for serialization and network latency so the
    /// poll response reliably beats the caller's own timeout.
    pub const POLL_BUDGET_PERCENT: u32 = 90;

    /// Delay before the next poll after a failed one.
    pub const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

    /// Expected processing time at which a service answers with a deferring response.
    pub const DEFER_THRESHOLD: Duration = Duration::from_secs(30);

    /// Path of the RPC servlet relative to a host's base URL.
    pub const SERVLET_PATH: &'static str = "intellihouse/RPC";

    /// Computes the long-poll wait budget for a channel timeout.
    pub fn poll_budget(transport_timeout: Duration) -> Duration {
        transport_timeout * Self::POLL_BUDGET_PERCENT / 100
    }
}
