use metrics::Counter;
use metrics_derive::Metrics;

/// Metrics for the [`RetrieveManager`](crate::RetrieveManager).
#[derive(Clone, Metrics)]
#[metrics(scope = "net_fetch")]
pub struct FetchMetrics {
    /// Number of requests sent to peers
    pub(crate) requests_sent: Counter,
    /// Number of items requested
    pub(crate) items_requested: Counter,
    /// Number of valid responses received
    pub(crate) responses_received: Counter,
    /// Number of requests that timed out
    pub(crate) timeouts: Counter,
    /// Number of responses that did not match their request
    pub(crate) protocol_violations: Counter,
    /// Number of requests that failed for other reasons
    pub(crate) failed_requests: Counter,
    /// Number of requests sent again to another peer
    pub(crate) redispatches: Counter,
    /// Number of requests that failed on every attempt
    pub(crate) retries_exhausted: Counter,
}
