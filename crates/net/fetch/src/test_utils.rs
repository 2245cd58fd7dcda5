//! A scriptable [`StateDataClient`] for tests.

use crate::{
    client::StateDataClient,
    error::{RequestError, RequestResult},
    message::{GetStateData, StateData},
};
use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use hyk_sync_primitives::PeerId;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::watch;

/// How a peer of the [`TestStateClient`] answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PeerBehaviour {
    /// Answers with the content it has.
    #[default]
    Honest,
    /// Never answers.
    Silent,
    /// Answers with one item less than requested.
    WrongCount,
    /// Answers with content that does not match the requested hashes.
    Corrupt,
    /// Answers with another request id.
    WrongRequestId,
    /// Answers that it has none of the content.
    Missing,
    /// Drops the connection.
    Dropped,
    /// Answers honestly once [`TestStateClient::open_gate`] was called.
    Gated,
}

/// In-memory [`StateDataClient`] serving a fixed set of content, with per peer behaviour.
#[derive(Debug, Clone)]
pub struct TestStateClient {
    content: Arc<Mutex<HashMap<B256, Bytes>>>,
    behaviours: Arc<Mutex<HashMap<PeerId, PeerBehaviour>>>,
    requests: Arc<Mutex<Vec<(PeerId, GetStateData)>>>,
    gate: Arc<watch::Sender<bool>>,
}

impl Default for TestStateClient {
    fn default() -> Self {
        Self {
            content: Default::default(),
            behaviours: Default::default(),
            requests: Default::default(),
            gate: Arc::new(watch::channel(false).0),
        }
    }
}

impl TestStateClient {
    /// Creates a client serving the content.
    pub fn with_content(content: impl IntoIterator<Item = (B256, Bytes)>) -> Self {
        let client = Self::default();
        client.content.lock().extend(content);
        client
    }

    /// Sets how the peer answers.
    pub fn set_behaviour(&self, peer_id: PeerId, behaviour: PeerBehaviour) {
        self.behaviours.lock().insert(peer_id, behaviour);
    }

    /// Releases all requests held by [`PeerBehaviour::Gated`] peers.
    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<(PeerId, GetStateData)> {
        self.requests.lock().clone()
    }

    /// Number of requests sent to the peer.
    pub fn requests_to(&self, peer_id: &PeerId) -> usize {
        self.requests.lock().iter().filter(|(peer, _)| peer == peer_id).count()
    }

    fn behaviour(&self, peer_id: &PeerId) -> PeerBehaviour {
        self.behaviours.lock().get(peer_id).copied().unwrap_or_default()
    }

    fn lookup(&self, hashes: &[B256]) -> Vec<Option<Bytes>> {
        let content = self.content.lock();
        hashes.iter().map(|hash| content.get(hash).cloned()).collect()
    }
}

#[async_trait]
impl StateDataClient for TestStateClient {
    async fn get_state_data(
        &self,
        peer_id: PeerId,
        request: GetStateData,
    ) -> RequestResult<StateData> {
        self.requests.lock().push((peer_id, request.clone()));
        let GetStateData { request_id, hashes } = request;

        let data = match self.behaviour(&peer_id) {
            PeerBehaviour::Honest => self.lookup(&hashes),
            PeerBehaviour::Silent => return std::future::pending().await,
            PeerBehaviour::Dropped => return Err(RequestError::ConnectionDropped),
            PeerBehaviour::WrongCount => {
                let mut data = self.lookup(&hashes);
                data.pop();
                data
            }
            PeerBehaviour::Corrupt => {
                hashes.iter().map(|_| Some(Bytes::from_static(b"corrupt"))).collect()
            }
            PeerBehaviour::WrongRequestId => {
                return Ok(StateData { request_id: request_id + 1, data: self.lookup(&hashes) })
            }
            PeerBehaviour::Missing => vec![None; hashes.len()],
            PeerBehaviour::Gated => {
                let mut gate = self.gate.subscribe();
                if gate.wait_for(|open| *open).await.is_err() {
                    return Err(RequestError::ChannelClosed)
                }
                self.lookup(&hashes)
            }
        };
        Ok(StateData { request_id, data })
    }
}
