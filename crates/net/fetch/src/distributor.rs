//! Assigns requests to idle peers.

use crate::{
    error::DispatchError,
    peers::{PeerSet, PeerSetState},
    reputation::{ReputationChangeKind, ReputationChangeOutcome},
};
use hyk_sync_primitives::{ContentKind, PeerId};
use hyk_tasks::Shutdown;
use std::collections::HashSet;
use tokio::time::Instant;
use tracing::trace;

/// Outcome of a selection round.
#[derive(Debug, PartialEq, Eq)]
enum Selection {
    /// The peer was marked busy and is leased to the caller.
    Leased(PeerId),
    /// A suitable peer exists but is busy, or no peer is connected.
    Wait,
    /// Every connected peer able to serve the request was already tried.
    NoAlternative,
    /// Every connected peer able to serve the request is banned.
    AllBanned,
}

/// Hands out peers for requests, one outstanding request per peer.
///
/// Among the idle peers that serve the requested content, were not tried for the request yet
/// and are not banned, the one with the lowest latency per item is picked. Peers whose
/// capacity hint is smaller than the request come last, ties go to the least recently used
/// peer.
#[derive(Debug, Clone)]
pub struct RequestDistributor {
    peers: PeerSet,
}

impl RequestDistributor {
    /// Creates a distributor over the peer set.
    pub const fn new(peers: PeerSet) -> Self {
        Self { peers }
    }

    /// The peer set.
    pub const fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Waits until a peer can take a request of `items` items of the given kind.
    ///
    /// Peers in `tried` are skipped. Returns [`DispatchError::NoAlternativePeer`] if all
    /// connected peers that serve the kind were tried and [`DispatchError::AllPeersBanned`] if
    /// all of them are banned. Without any connected peer serving the kind this waits for one to
    /// join.
    pub async fn dispatch(
        &self,
        kind: ContentKind,
        items: usize,
        tried: &HashSet<PeerId>,
        shutdown: &Shutdown,
    ) -> Result<PeerLease, DispatchError> {
        let mut shutdown = shutdown.clone();
        loop {
            // register before looking at the peers so a release in between is not missed
            let notified = self.peers.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if shutdown.is_fired() {
                return Err(DispatchError::Cancelled)
            }
            let selection = select_peer(&mut self.peers.lock(), kind, items, tried);
            match selection {
                Selection::Leased(peer_id) => {
                    trace!(target: "net::fetch", ?peer_id, %kind, items, "Dispatched request");
                    return Ok(PeerLease::new(self.peers.clone(), peer_id))
                }
                Selection::NoAlternative => return Err(DispatchError::NoAlternativePeer),
                Selection::AllBanned => return Err(DispatchError::AllPeersBanned),
                Selection::Wait => {}
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = &mut shutdown => return Err(DispatchError::Cancelled),
            }
        }
    }
}

fn select_peer(
    state: &mut PeerSetState,
    kind: ContentKind,
    items: usize,
    tried: &HashSet<PeerId>,
) -> Selection {
    let mut capable = false;
    let mut untried = false;
    let best = state
        .peers
        .values()
        .filter(|peer| peer.info.capability.supports(kind))
        .inspect(|_| capable = true)
        .filter(|peer| !peer.info.is_banned() && !tried.contains(&peer.info.id))
        .inspect(|_| untried = true)
        .filter(|peer| !peer.info.busy)
        .min_by_key(|peer| {
            let too_small = peer.info.capacity_hint != 0 && peer.info.capacity_hint < items;
            (too_small, peer.info.latency_per_item, peer.last_dispatched, peer.info.id)
        })
        .map(|peer| peer.info.id);

    match best {
        Some(id) => {
            state.tick += 1;
            let tick = state.tick;
            if let Some(peer) = state.peers.get_mut(&id) {
                peer.info.busy = true;
                peer.last_dispatched = tick;
            }
            Selection::Leased(id)
        }
        None if untried || !capable => Selection::Wait,
        None if tried.is_empty() => Selection::AllBanned,
        None => Selection::NoAlternative,
    }
}

/// A peer reserved for one request.
///
/// The peer is released when the lease is dropped, whether the request finished or was
/// abandoned.
#[derive(Debug)]
pub struct PeerLease {
    peers: PeerSet,
    peer_id: PeerId,
    dispatched_at: Instant,
}

impl PeerLease {
    fn new(peers: PeerSet, peer_id: PeerId) -> Self {
        Self { peers, peer_id, dispatched_at: Instant::now() }
    }

    /// The leased peer.
    pub const fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Records a successful response to a request of `items` items and releases the peer.
    pub fn on_success(self, items: usize) {
        self.peers.record_success(&self.peer_id, items, self.dispatched_at.elapsed());
    }

    /// Records a failed request and releases the peer.
    pub fn on_failure(self, kind: ReputationChangeKind) -> ReputationChangeOutcome {
        self.peers.penalize(&self.peer_id, kind)
    }
}

impl Drop for PeerLease {
    fn drop(&mut self) {
        self.peers.release(&self.peer_id);
    }
}
