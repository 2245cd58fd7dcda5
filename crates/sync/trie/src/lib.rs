//! Scheduling for state trie sync.
//!
//! The [`Scheduler`] keeps track of every trie node and code blob that is still missing from the
//! local state, hands them out in batches, and verifies and decodes delivered content. Decoding
//! a node schedules its children. Account leaves are passed to a [`LeafDecoder`] which
//! extracts the storage trie root and code hash of the account.
//!
//! Verified content is buffered in a [`StagingStore`] and written to the [`StateStore`] once the
//! sync completes. A [`SkipFilter`] remembers committed hashes so content that is already
//! present is not requested again.

#![doc(issue_tracker_base_url = "https://github.com/hayekchain/hyk-sync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod bitmap;
pub mod error;
pub mod filter;
pub mod leaf;
mod metrics;
pub mod node;
mod path;
pub mod scheduler;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{DecodeError, FilterError, StoreError, SyncError, SyncResult};
pub use filter::{SkipFilter, SkipFilterCheckpoint, SkipFilterConfig};
pub use leaf::{AccountLeafDecoder, LeafDecoder, LeafRefs, TrieAccount};
pub use crate::metrics::SyncMetrics;
pub use path::SyncPath;
pub use scheduler::{Batch, CommitStats, ItemKind, PendingItem, Scheduler, SyncStatus};
pub use store::{StagingStore, StateStore};
