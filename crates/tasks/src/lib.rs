//! Task primitives shared by the sync engine.
//!
//! The only primitive currently needed is the [`shutdown`] signal, which is used as the single
//! cancellation source for every worker, dispatcher and request timer of a sync.

#![doc(issue_tracker_base_url = "https://github.com/hayekchain/hyk-sync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod shutdown;

pub use shutdown::{signal, Shutdown, Signal};
