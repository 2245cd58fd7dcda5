use crate::reputation::ReputationChangeKind;
use hyk_sync_primitives::GotExpected;

/// Result alias for result of a request.
pub type RequestResult<T> = Result<T, RequestError>;

/// Error variants that can happen when sending a request to a peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Closed channel to the peer.
    #[error("closed channel to the peer")]
    ChannelClosed,
    /// Connection to a peer dropped while handling the request.
    #[error("connection to a peer dropped while handling the request")]
    ConnectionDropped,
    /// Capability message is not supported by the remote peer.
    #[error("capability message is not supported by remote peer")]
    UnsupportedCapability,
    /// Request timed out while awaiting response.
    #[error("request timed out while awaiting response")]
    Timeout,
    /// The response does not match the request.
    #[error(transparent)]
    ProtocolViolation(#[from] ProtocolViolation),
}

// === impl RequestError ===

impl RequestError {
    /// The reputation change the error warrants for the peer, if any.
    ///
    /// A closed channel is a local problem and unsupported capabilities are never requested
    /// on purpose, neither is the peer's fault.
    pub const fn reputation_change_kind(&self) -> Option<ReputationChangeKind> {
        match self {
            Self::ChannelClosed | Self::UnsupportedCapability => None,
            Self::ConnectionDropped => Some(ReputationChangeKind::Dropped),
            Self::Timeout => Some(ReputationChangeKind::Timeout),
            Self::ProtocolViolation(_) => Some(ReputationChangeKind::BadProtocol),
        }
    }

    /// Returns `true` if the request timed out.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// A response that does not answer the request it was sent for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// The response carries another request id.
    #[error("response for another request: {0}")]
    RequestIdMismatch(GotExpected<u64>),
    /// The response does not have exactly one entry per requested hash.
    #[error("response item count mismatch: {0}")]
    ItemCountMismatch(GotExpected<usize>),
}

/// Errors of the [`RequestDistributor`](crate::RequestDistributor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The shutdown signal fired while waiting for a peer.
    #[error("dispatch cancelled")]
    Cancelled,
    /// Every connected peer able to serve the request was already tried.
    #[error("no untried peer can serve the request")]
    NoAlternativePeer,
    /// Every connected peer able to serve the request is banned.
    #[error("all peers able to serve the request are banned")]
    AllPeersBanned,
}

/// Errors of the [`RetrieveManager`](crate::RetrieveManager).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrieveError {
    /// The shutdown signal fired.
    #[error("retrieval cancelled")]
    Cancelled,
    /// No attempt produced a valid response.
    #[error("request failed after {attempts} attempts")]
    RetriesExhausted {
        /// Number of peers the request was sent to.
        attempts: usize,
        /// Error of the last attempt.
        #[source]
        last: Option<RequestError>,
    },
    /// Every connected peer able to serve the request is banned.
    #[error("no usable peer for the request")]
    NoUsablePeer,
    /// A request must contain at least one hash.
    #[error("empty request")]
    EmptyRequest,
}
