//! Sends requests and retries them on other peers.

use crate::{
    client::StateDataClient,
    distributor::RequestDistributor,
    error::{DispatchError, ProtocolViolation, RequestError, RequestResult, RetrieveError},
    message::{GetStateData, RequestId, StateData},
    metrics::FetchMetrics,
    peers::PeerSet,
};
use alloy_primitives::{Bytes, B256};
use hyk_sync_primitives::{ContentKind, GotExpected, WithPeerId};
use hyk_tasks::Shutdown;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, trace};

/// Default number of times a request is sent to another peer after the first attempt failed.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Default response time allowance per requested item.
pub const DEFAULT_TIMEOUT_PER_ITEM: Duration = Duration::from_millis(50);

/// Default lower bound of a request timeout.
pub const DEFAULT_MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default upper bound of a request timeout.
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry and timeout policy of the [`RetrieveManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetrieveConfig {
    /// How often a failed request is sent to another peer.
    pub max_retries: usize,
    /// Response time allowance per requested item.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub timeout_per_item: Duration,
    /// Lower bound of a request timeout.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub min_timeout: Duration,
    /// Upper bound of a request timeout.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub max_timeout: Duration,
}

impl RetrieveConfig {
    /// Timeout of a request for `items` items.
    pub fn timeout_for(&self, items: usize) -> Duration {
        let items = u32::try_from(items).unwrap_or(u32::MAX);
        let max = self.max_timeout.max(self.min_timeout);
        self.timeout_per_item.saturating_mul(items).clamp(self.min_timeout, max)
    }
}

impl Default for RetrieveConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_per_item: DEFAULT_TIMEOUT_PER_ITEM,
            min_timeout: DEFAULT_MIN_TIMEOUT,
            max_timeout: DEFAULT_MAX_TIMEOUT,
        }
    }
}

/// Sends state data requests to peers picked by the [`RequestDistributor`].
///
/// A request that times out or gets an invalid response is sent to another peer, up to
/// [`RetrieveConfig::max_retries`] times. The failing peer is penalized.
#[derive(Debug, Clone)]
pub struct RetrieveManager<C> {
    client: C,
    distributor: RequestDistributor,
    config: RetrieveConfig,
    next_request_id: Arc<AtomicU64>,
    metrics: FetchMetrics,
}

impl<C: StateDataClient> RetrieveManager<C> {
    /// Creates a new manager.
    pub fn new(client: C, peers: PeerSet, config: RetrieveConfig) -> Self {
        Self {
            client,
            distributor: RequestDistributor::new(peers),
            config,
            next_request_id: Arc::new(AtomicU64::new(0)),
            metrics: FetchMetrics::default(),
        }
    }

    /// Sets the metrics.
    pub fn with_metrics(mut self, metrics: FetchMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// The peer set requests are distributed over.
    pub const fn peers(&self) -> &PeerSet {
        self.distributor.peers()
    }

    /// The retry policy.
    pub const fn config(&self) -> &RetrieveConfig {
        &self.config
    }

    fn next_request_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Requests the content of `hashes`, which must all be of the given kind.
    ///
    /// Resolves with the first valid response: one entry per hash, in order, `None` for
    /// content the peer doesn't have. The content itself is not verified here.
    pub async fn send(
        &self,
        kind: ContentKind,
        hashes: Vec<B256>,
        shutdown: &Shutdown,
    ) -> Result<WithPeerId<Vec<Option<Bytes>>>, RetrieveError> {
        if hashes.is_empty() {
            return Err(RetrieveError::EmptyRequest)
        }
        let items = hashes.len();
        let timeout = self.config.timeout_for(items);
        let mut shutdown = shutdown.clone();
        let mut tried = HashSet::new();
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            let lease = match self.distributor.dispatch(kind, items, &tried, &shutdown).await {
                Ok(lease) => lease,
                Err(DispatchError::Cancelled) => return Err(RetrieveError::Cancelled),
                Err(DispatchError::NoAlternativePeer) => break,
                Err(DispatchError::AllPeersBanned) => {
                    debug!(target: "net::fetch", %kind, items, "All capable peers are banned");
                    return Err(RetrieveError::NoUsablePeer)
                }
            };
            let peer_id = lease.peer_id();
            tried.insert(peer_id);
            if attempt > 0 {
                self.metrics.redispatches.increment(1);
            }

            let request_id = self.next_request_id();
            let request = GetStateData { request_id, hashes: hashes.clone() };
            trace!(target: "net::fetch", ?peer_id, request_id, %kind, items, attempt, "Sending request");
            self.metrics.requests_sent.increment(1);
            self.metrics.items_requested.increment(items as u64);

            let request = tokio::time::timeout(timeout, self.client.get_state_data(peer_id, request));
            let response = tokio::select! {
                biased;
                _ = &mut shutdown => return Err(RetrieveError::Cancelled),
                response = request => response.unwrap_or(Err(RequestError::Timeout)),
            };

            match response.and_then(|response| validate_response(request_id, items, response)) {
                Ok(data) => {
                    self.metrics.responses_received.increment(1);
                    lease.on_success(items);
                    return Ok(WithPeerId::new(peer_id, data))
                }
                Err(err) => {
                    debug!(target: "net::fetch", ?peer_id, request_id, %err, attempt, "Request failed");
                    match &err {
                        RequestError::Timeout => self.metrics.timeouts.increment(1),
                        RequestError::ProtocolViolation(_) => {
                            self.metrics.protocol_violations.increment(1)
                        }
                        _ => self.metrics.failed_requests.increment(1),
                    }
                    if let Some(kind) = err.reputation_change_kind() {
                        lease.on_failure(kind);
                    }
                    last_error = Some(err);
                }
            }
        }

        self.metrics.retries_exhausted.increment(1);
        debug!(target: "net::fetch", %kind, items, attempts = tried.len(), "Retries exhausted");
        Err(RetrieveError::RetriesExhausted { attempts: tried.len(), last: last_error })
    }
}

fn validate_response(
    request_id: RequestId,
    items: usize,
    response: StateData,
) -> RequestResult<Vec<Option<Bytes>>> {
    if response.request_id != request_id {
        return Err(
            ProtocolViolation::RequestIdMismatch(GotExpected::new(response.request_id, request_id))
                .into(),
        )
    }
    if response.data.len() != items {
        return Err(
            ProtocolViolation::ItemCountMismatch(GotExpected::new(response.data.len(), items))
                .into(),
        )
    }
    Ok(response.data)
}
