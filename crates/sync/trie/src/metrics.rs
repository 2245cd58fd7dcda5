use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// Metrics for the trie sync [`Scheduler`](crate::Scheduler).
#[derive(Clone, Metrics)]
#[metrics(scope = "trie_sync")]
pub struct SyncMetrics {
    /// Number of trie nodes committed
    pub(crate) nodes_committed: Counter,
    /// Number of code blobs committed
    pub(crate) codes_committed: Counter,
    /// Number of bytes committed
    pub(crate) bytes_committed: Counter,
    /// Number of deliveries that did not hash to the requested hash
    pub(crate) hash_mismatches: Counter,
    /// Number of deliveries for hashes that were not in flight
    pub(crate) unrequested_deliveries: Counter,
    /// Number of discovered hashes skipped because they were already scheduled
    pub(crate) duplicate_items: Counter,
    /// Number of discovered hashes skipped because the content is already stored
    pub(crate) known_items: Counter,
    /// Number of skip filter hits the store did not confirm
    pub(crate) filter_false_positives: Counter,
    /// Number of items waiting to be requested
    pub(crate) pending: Gauge,
    /// Number of items requested and not yet committed
    pub(crate) in_flight: Gauge,
}
