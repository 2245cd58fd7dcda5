//! Drives a [`Scheduler`] with a pool of request workers.

use crate::{error::StateSyncError, metrics::StateSyncMetrics};
use alloy_primitives::{Bytes, B256};
use futures::future::try_join_all;
use hyk_config::StateSyncConfig;
use hyk_net_fetch::{
    FetchMetrics, PeerSet, ReputationChangeKind, RetrieveError, RetrieveManager, StateDataClient,
};
use hyk_sync_primitives::PeerId;
use hyk_tasks::{signal, Shutdown, Signal};
use hyk_trie_sync::{
    AccountLeafDecoder, LeafDecoder, Scheduler, StateStore, SyncError, SyncStatus,
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};

/// Totals of a completed sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Trie nodes downloaded.
    pub nodes: usize,
    /// Code blobs downloaded.
    pub codes: usize,
    /// Bytes downloaded.
    pub bytes: usize,
    /// Entries written to the store.
    pub flushed: usize,
}

/// Cancels a running [`StateSync`] from anywhere.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    signal: Arc<Mutex<Option<Signal>>>,
}

impl SyncHandle {
    /// Cancels the sync. Waiting workers wake up, outstanding requests are abandoned and their
    /// items become missing again.
    pub fn cancel(&self) {
        if let Some(signal) = self.signal.lock().take() {
            signal.fire();
        }
    }
}

/// Downloads a state trie from the network.
///
/// Up to [`StateSyncConfig::workers`] workers repeatedly take a batch from the scheduler, send
/// it through the [`RetrieveManager`] and commit the response. The scheduler lock is never held
/// while waiting. Once nothing is missing or in flight the staged state is flushed to the
/// store.
#[derive(Debug)]
pub struct StateSync<S, C, D = AccountLeafDecoder> {
    scheduler: Mutex<Scheduler<S, D>>,
    retriever: RetrieveManager<C>,
    config: StateSyncConfig,
    /// Woken whenever the scheduler state changes.
    progress: Notify,
    shutdown: Shutdown,
    handle: SyncHandle,
    metrics: StateSyncMetrics,
}

impl<S, C, D> StateSync<S, C, D>
where
    S: StateStore,
    C: StateDataClient,
    D: LeafDecoder,
{
    /// Creates a sync fetching from the given peers.
    pub fn new(
        config: StateSyncConfig,
        scheduler: Scheduler<S, D>,
        client: C,
        peers: PeerSet,
    ) -> Self {
        let (signal, shutdown) = signal();
        let retriever = RetrieveManager::new(client, peers, config.retrieve);
        Self {
            scheduler: Mutex::new(scheduler),
            retriever,
            config,
            progress: Notify::new(),
            shutdown,
            handle: SyncHandle { signal: Arc::new(Mutex::new(Some(signal))) },
            metrics: StateSyncMetrics::default(),
        }
    }

    /// Sets the driver metrics.
    pub fn with_metrics(mut self, metrics: StateSyncMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the request metrics.
    pub fn with_fetch_metrics(mut self, metrics: FetchMetrics) -> Self {
        self.retriever = self.retriever.with_metrics(metrics);
        self
    }

    /// Adds the state root to sync.
    pub fn add_root(&self, root: B256) -> Result<(), SyncError> {
        self.scheduler.lock().add_root(root)
    }

    /// Returns a handle that can cancel the sync.
    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Cancels the sync.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// The peers requests are sent to.
    pub const fn peers(&self) -> &PeerSet {
        self.retriever.peers()
    }

    /// Number of missing items.
    pub fn pending(&self) -> usize {
        self.scheduler.lock().pending()
    }

    /// Number of requested items.
    pub fn in_flight(&self) -> usize {
        self.scheduler.lock().in_flight()
    }

    /// Current scheduler status.
    pub fn status(&self) -> SyncStatus {
        self.scheduler.lock().status()
    }

    /// Runs `f` with exclusive access to the scheduler.
    pub fn with_scheduler<R>(&self, f: impl FnOnce(&mut Scheduler<S, D>) -> R) -> R {
        f(&mut self.scheduler.lock())
    }

    /// Runs the sync until the state is complete, the sync is cancelled, verified content fails
    /// to decode, or the network stops making progress.
    ///
    /// On completion the staged state is written to the store. In every other case the
    /// committed content stays staged and all requested items become missing again.
    pub async fn run(&self) -> Result<SyncStats, StateSyncError> {
        {
            let scheduler = self.scheduler.lock();
            if !scheduler.is_seeded() {
                return Err(StateSyncError::NoRoot)
            }
            info!(
                target: "sync::state",
                workers = self.config.workers,
                batch_size = self.config.batch_size,
                pending = scheduler.pending(),
                "Starting state sync"
            );
        }

        let stalled = AtomicUsize::new(0);
        let workers = self.config.workers.max(1);
        let result = try_join_all((0..workers).map(|id| self.worker(id, &stalled))).await;

        let mut scheduler = self.scheduler.lock();
        let abandoned = scheduler.reset_in_flight();
        if abandoned > 0 {
            debug!(target: "sync::state", abandoned, "Returned requested items to the missing set");
        }
        self.metrics.active_workers.set(0.0);
        if let Err(err) = result {
            warn!(target: "sync::state", %err, pending = scheduler.pending(), "State sync ended");
            return Err(err)
        }

        let stats = scheduler.stats();
        let flushed = scheduler.flush().map_err(StateSyncError::Flush)?;
        info!(
            target: "sync::state",
            nodes = stats.nodes,
            codes = stats.codes,
            bytes = stats.bytes,
            flushed,
            "State sync complete"
        );
        Ok(SyncStats { nodes: stats.nodes, codes: stats.codes, bytes: stats.bytes, flushed })
    }

    async fn worker(&self, id: usize, stalled: &AtomicUsize) -> Result<(), StateSyncError> {
        let batch_size = self.config.batch_size.max(1);
        let mut shutdown = self.shutdown.clone();
        loop {
            // register before looking at the scheduler so a commit in between is not missed
            let progress = self.progress.notified();
            tokio::pin!(progress);
            progress.as_mut().enable();

            let batch = {
                let mut scheduler = self.scheduler.lock();
                if self.shutdown.is_fired() {
                    return Err(StateSyncError::Cancelled)
                }
                match scheduler.status() {
                    SyncStatus::Complete => return Ok(()),
                    SyncStatus::Aborted(err) => return Err(StateSyncError::Aborted(err)),
                    SyncStatus::Running => scheduler.next_batch(batch_size),
                }
            };

            if batch.is_empty() {
                trace!(target: "sync::state", worker = id, "Waiting for progress");
                tokio::select! {
                    _ = &mut progress => continue,
                    _ = &mut shutdown => return Err(StateSyncError::Cancelled),
                }
            }

            let kind = batch.kind();
            let hashes = batch.hashes();
            trace!(target: "sync::state", worker = id, %kind, items = hashes.len(), "Requesting batch");
            self.metrics.active_workers.increment(1.0);
            let response = self.retriever.send(kind, hashes.clone(), &self.shutdown).await;
            self.metrics.active_workers.decrement(1.0);

            let progressed = match response {
                Ok(response) => {
                    self.metrics.batches_completed.increment(1);
                    let (peer_id, data) = response.split();
                    let result = self.on_response(peer_id, &hashes, data);
                    self.progress.notify_waiters();
                    result?
                }
                Err(err) => {
                    self.scheduler.lock().requeue(hashes);
                    self.progress.notify_waiters();
                    if matches!(err, RetrieveError::Cancelled) {
                        return Err(StateSyncError::Cancelled)
                    }
                    self.metrics.batches_failed.increment(1);
                    debug!(target: "sync::state", worker = id, %kind, %err, "Batch failed");
                    false
                }
            };

            if progressed {
                stalled.store(0, Ordering::Relaxed);
                self.metrics.stalled_rounds.set(0.0);
                continue
            }

            let rounds = stalled.fetch_add(1, Ordering::Relaxed) + 1;
            self.metrics.stalled_rounds.set(rounds as f64);
            if rounds >= self.config.max_stalled_rounds.max(1) {
                warn!(target: "sync::state", rounds, pending = self.pending(), "State sync stalled");
                return Err(StateSyncError::Stalled { rounds })
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_backoff) => {}
                _ = &mut shutdown => return Err(StateSyncError::Cancelled),
            }
        }
    }

    /// Commits a response. Returns `true` if any item was committed.
    fn on_response(
        &self,
        peer_id: PeerId,
        hashes: &[B256],
        data: Vec<Option<Bytes>>,
    ) -> Result<bool, StateSyncError> {
        let mut scheduler = self.scheduler.lock();
        if self.shutdown.is_fired() {
            scheduler.requeue(hashes.iter().copied());
            return Err(StateSyncError::Cancelled)
        }

        let mut committed = 0usize;
        let mut rejected = 0usize;
        let mut not_served = Vec::new();
        for (hash, data) in hashes.iter().copied().zip(data) {
            let Some(data) = data else {
                not_served.push(hash);
                continue
            };
            match scheduler.commit(hash, data) {
                Ok(()) => committed += 1,
                Err(SyncError::HashMismatch(mismatch)) => {
                    trace!(target: "sync::state", ?peer_id, %mismatch, "Rejected delivery");
                    rejected += 1;
                }
                Err(err) if err.is_fatal() => return Err(StateSyncError::Aborted(err)),
                Err(err) => {
                    debug!(target: "sync::state", ?peer_id, %hash, %err, "Failed to commit delivery")
                }
            }
        }
        scheduler.requeue(not_served.iter().copied());
        drop(scheduler);

        self.metrics.items_not_served.increment(not_served.len() as u64);
        if rejected > 0 {
            self.metrics.bad_deliveries.increment(rejected as u64);
            debug!(target: "sync::state", ?peer_id, rejected, "Peer delivered bad data");
            self.retriever.peers().penalize(&peer_id, ReputationChangeKind::BadData);
        }
        trace!(
            target: "sync::state",
            ?peer_id,
            committed,
            rejected,
            not_served = not_served.len(),
            "Processed response"
        );
        Ok(committed > 0)
    }
}
