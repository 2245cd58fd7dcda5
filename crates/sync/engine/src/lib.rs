//! State sync driver.
//!
//! [`StateSync`] connects the trie [`Scheduler`](hyk_trie_sync::Scheduler) with the peer
//! fetching layer and runs the sync to completion.
//!
//! ```ignore
//! let scheduler = Scheduler::with_store(store, Arc::new(SkipFilter::new(config.skip_filter)));
//! let sync = StateSync::new(config, scheduler, client, peers);
//! sync.add_root(state_root)?;
//! let stats = sync.run().await?;
//! ```

#![doc(issue_tracker_base_url = "https://github.com/hayekchain/hyk-sync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
mod metrics;
mod sync;

pub use crate::metrics::StateSyncMetrics;
pub use error::StateSyncError;
pub use hyk_config::StateSyncConfig;
pub use sync::{StateSync, SyncHandle, SyncStats};
