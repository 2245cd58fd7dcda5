//! Registry of the peers state data can be requested from.

use crate::reputation::{
    apply_change, is_banned_reputation, Reputation, ReputationChangeKind,
    ReputationChangeOutcome, ReputationChangeWeights, DEFAULT_REPUTATION,
};
use hyk_sync_primitives::{ContentKind, PeerId};
use parking_lot::{Mutex, MutexGuard};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{broadcast, futures::Notified, Notify};
use tracing::{debug, trace};

/// Default latency per item assumed for a peer without measurements.
pub const DEFAULT_INITIAL_LATENCY_PER_ITEM: Duration = Duration::from_millis(20);

/// Default upper bound of the latency per item after penalties.
pub const DEFAULT_MAX_LATENCY_PER_ITEM: Duration = Duration::from_secs(2);

/// Capacity of the peer event channel.
const PEER_EVENT_CHANNEL_SIZE: usize = 64;

/// Which content a peer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ServeCapability {
    /// Trie nodes only.
    Nodes,
    /// Code only.
    Code,
    /// Trie nodes and code.
    Full,
}

impl ServeCapability {
    /// Returns `true` if content of the kind can be requested from the peer.
    pub const fn supports(&self, kind: ContentKind) -> bool {
        matches!(
            (self, kind),
            (Self::Full, _) | (Self::Nodes, ContentKind::Node) | (Self::Code, ContentKind::Code)
        )
    }
}

/// Scoring of peer performance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PeerScoringConfig {
    /// Latency per item assumed for new peers.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub initial_latency_per_item: Duration,
    /// Latency penalties never raise the estimate above this.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub max_latency_per_item: Duration,
    /// How failures affect a peer's reputation.
    pub reputation_weights: ReputationChangeWeights,
}

impl Default for PeerScoringConfig {
    fn default() -> Self {
        Self {
            initial_latency_per_item: DEFAULT_INITIAL_LATENCY_PER_ITEM,
            max_latency_per_item: DEFAULT_MAX_LATENCY_PER_ITEM,
            reputation_weights: ReputationChangeWeights::default(),
        }
    }
}

/// Peer set changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    /// A peer joined.
    Added(PeerId),
    /// A peer left.
    Removed(PeerId),
}

/// Snapshot of a peer's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Peer id.
    pub id: PeerId,
    /// Content the peer serves.
    pub capability: ServeCapability,
    /// Number of items the peer is known to serve in one request. Zero if unknown.
    pub capacity_hint: usize,
    /// Rolling estimate of the time the peer takes per requested item.
    pub latency_per_item: Duration,
    /// Current reputation.
    pub reputation: Reputation,
    /// Whether the peer has an outstanding request.
    pub busy: bool,
    /// Number of successful requests.
    pub successes: u64,
    /// Number of failed requests.
    pub failures: u64,
}

impl PeerInfo {
    /// Returns `true` if the peer is below the ban threshold.
    pub const fn is_banned(&self) -> bool {
        is_banned_reputation(self.reputation)
    }
}

#[derive(Debug)]
pub(crate) struct Peer {
    pub(crate) info: PeerInfo,
    /// Dispatch tick of the last lease, zero if never leased.
    pub(crate) last_dispatched: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PeerSetState {
    pub(crate) peers: HashMap<PeerId, Peer>,
    /// Monotonic counter ordering leases.
    pub(crate) tick: u64,
}

#[derive(Debug)]
struct PeerSetInner {
    state: Mutex<PeerSetState>,
    /// Woken whenever a peer becomes available or the set changes.
    available: Notify,
    events: broadcast::Sender<PeerEvent>,
    config: PeerScoringConfig,
}

/// The connected peers and their scores.
///
/// Cloning is cheap, all clones share the same set.
#[derive(Debug, Clone)]
pub struct PeerSet {
    inner: Arc<PeerSetInner>,
}

impl PeerSet {
    /// Creates an empty peer set.
    pub fn new(config: PeerScoringConfig) -> Self {
        let (events, _) = broadcast::channel(PEER_EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(PeerSetInner {
                state: Mutex::new(PeerSetState::default()),
                available: Notify::new(),
                events,
                config,
            }),
        }
    }

    /// Adds a peer, or updates capability and capacity of a known peer.
    ///
    /// Returns `true` if the peer is new.
    pub fn add_peer(&self, id: PeerId, capability: ServeCapability, capacity_hint: usize) -> bool {
        let added = {
            let mut state = self.inner.state.lock();
            if let Some(peer) = state.peers.get_mut(&id) {
                peer.info.capability = capability;
                peer.info.capacity_hint = capacity_hint;
                false
            } else {
                let info = PeerInfo {
                    id,
                    capability,
                    capacity_hint,
                    latency_per_item: self.inner.config.initial_latency_per_item,
                    reputation: DEFAULT_REPUTATION,
                    busy: false,
                    successes: 0,
                    failures: 0,
                };
                state.peers.insert(id, Peer { info, last_dispatched: 0 });
                true
            }
        };
        if added {
            debug!(target: "net::fetch", ?id, ?capability, capacity_hint, "Peer added");
            let _ = self.inner.events.send(PeerEvent::Added(id));
        }
        self.inner.available.notify_waiters();
        added
    }

    /// Removes a peer. Returns `true` if it was known.
    ///
    /// An outstanding request of the peer keeps running, its lease release is a no-op.
    pub fn remove_peer(&self, id: &PeerId) -> bool {
        let removed = self.inner.state.lock().peers.remove(id).is_some();
        if removed {
            debug!(target: "net::fetch", ?id, "Peer removed");
            let _ = self.inner.events.send(PeerEvent::Removed(*id));
            self.inner.available.notify_waiters();
        }
        removed
    }

    /// Subscribes to peer joins and leaves.
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.inner.events.subscribe()
    }

    /// Returns a snapshot of the peer.
    pub fn peer(&self, id: &PeerId) -> Option<PeerInfo> {
        self.inner.state.lock().peers.get(id).map(|peer| peer.info.clone())
    }

    /// Number of connected peers.
    pub fn len(&self) -> usize {
        self.inner.state.lock().peers.len()
    }

    /// Returns `true` if no peer is connected.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().peers.is_empty()
    }

    /// Applies a reputation change to the peer.
    pub fn apply_reputation_change(
        &self,
        id: &PeerId,
        kind: ReputationChangeKind,
    ) -> ReputationChangeOutcome {
        let mut state = self.inner.state.lock();
        let Some(peer) = state.peers.get_mut(id) else { return ReputationChangeOutcome::None };
        self.change_reputation(peer, kind)
    }

    /// Penalizes a failed request: the latency estimate doubles and the reputation drops.
    pub fn penalize(&self, id: &PeerId, kind: ReputationChangeKind) -> ReputationChangeOutcome {
        let mut state = self.inner.state.lock();
        let Some(peer) = state.peers.get_mut(id) else { return ReputationChangeOutcome::None };
        peer.info.failures += 1;
        peer.info.latency_per_item =
            (peer.info.latency_per_item * 2).min(self.inner.config.max_latency_per_item);
        self.change_reputation(peer, kind)
    }

    fn change_reputation(
        &self,
        peer: &mut Peer,
        kind: ReputationChangeKind,
    ) -> ReputationChangeOutcome {
        let change = self.inner.config.reputation_weights.change(kind);
        let (reputation, outcome) = apply_change(peer.info.reputation, kind, change);
        peer.info.reputation = reputation;
        match outcome {
            ReputationChangeOutcome::Ban => {
                debug!(target: "net::fetch", id = ?peer.info.id, reputation, ?kind, "Peer banned")
            }
            ReputationChangeOutcome::Unban => {
                debug!(target: "net::fetch", id = ?peer.info.id, reputation, "Peer unbanned")
            }
            ReputationChangeOutcome::None => {
                trace!(target: "net::fetch", id = ?peer.info.id, reputation, ?kind, "Reputation changed")
            }
        }
        outcome
    }

    /// Folds a latency sample into the rolling estimate.
    pub(crate) fn record_success(&self, id: &PeerId, items: usize, elapsed: Duration) {
        let mut state = self.inner.state.lock();
        let Some(peer) = state.peers.get_mut(id) else { return };
        let items = u32::try_from(items.max(1)).unwrap_or(u32::MAX);
        let sample = elapsed / items;
        peer.info.latency_per_item = peer.info.latency_per_item * 7 / 8 + sample / 8;
        peer.info.successes += 1;
    }

    /// Marks the peer idle and wakes waiting dispatchers.
    pub(crate) fn release(&self, id: &PeerId) {
        if let Some(peer) = self.inner.state.lock().peers.get_mut(id) {
            peer.info.busy = false;
        }
        self.inner.available.notify_waiters();
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PeerSetState> {
        self.inner.state.lock()
    }

    pub(crate) fn notified(&self) -> Notified<'_> {
        self.inner.available.notified()
    }
}

impl Default for PeerSet {
    fn default() -> Self {
        Self::new(PeerScoringConfig::default())
    }
}
