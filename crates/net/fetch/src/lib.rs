//! Fetching of state data from peers.
//!
//! The [`PeerSet`] tracks connected peers together with what they serve and how well they
//! perform. The [`RequestDistributor`] leases idle peers for requests and the
//! [`RetrieveManager`] sends requests through a [`StateDataClient`], enforcing timeouts and
//! moving failed requests to other peers.

#![doc(issue_tracker_base_url = "https://github.com/hayekchain/hyk-sync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod client;
pub mod distributor;
pub mod error;
pub mod message;
mod metrics;
pub mod peers;
pub mod reputation;
pub mod retriever;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::metrics::FetchMetrics;
pub use client::StateDataClient;
pub use distributor::{PeerLease, RequestDistributor};
pub use error::{DispatchError, ProtocolViolation, RequestError, RequestResult, RetrieveError};
pub use message::{GetStateData, RequestId, StateData};
pub use peers::{PeerEvent, PeerInfo, PeerScoringConfig, PeerSet, ServeCapability};
pub use reputation::{Reputation, ReputationChangeKind, ReputationChangeWeights};
pub use retriever::{RetrieveConfig, RetrieveManager};
