use crate::{
    error::RequestResult,
    message::{GetStateData, StateData},
};
use async_trait::async_trait;
use hyk_sync_primitives::PeerId;

/// Sends state data requests to connected peers.
#[async_trait]
pub trait StateDataClient: Send + Sync {
    /// Sends the request to the peer and resolves with its response.
    async fn get_state_data(&self, peer_id: PeerId, request: GetStateData)
        -> RequestResult<StateData>;
}
