use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// Metrics for the [`StateSync`](crate::StateSync) driver.
#[derive(Clone, Metrics)]
#[metrics(scope = "state_sync")]
pub struct StateSyncMetrics {
    /// Number of batches answered by a peer
    pub(crate) batches_completed: Counter,
    /// Number of batches that failed on every attempt
    pub(crate) batches_failed: Counter,
    /// Number of items peers answered they don't have
    pub(crate) items_not_served: Counter,
    /// Number of delivered items that did not match their hash
    pub(crate) bad_deliveries: Counter,
    /// Number of consecutive batches without progress
    pub(crate) stalled_rounds: Gauge,
    /// Number of workers waiting for a request to finish
    pub(crate) active_workers: Gauge,
}
