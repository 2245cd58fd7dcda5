//! Tracks the content that is still missing from the local state and decides what to request
//! next.

use crate::{
    error::{DecodeError, SyncError, SyncResult},
    filter::SkipFilter,
    leaf::{AccountLeafDecoder, LeafDecoder},
    metrics::SyncMetrics,
    node::{node_children, NodeChild},
    path::SyncPath,
    store::{StagingStore, StateStore},
};
use alloy_primitives::{keccak256, Bytes, B256};
use hyk_sync_primitives::{is_empty_code_hash, is_empty_root, ContentKind, GotExpected};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::{debug, error, info, trace};

/// What a scheduled hash refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A node of the account trie.
    AccountNode,
    /// A node of a storage trie.
    StorageNode,
    /// Contract bytecode.
    Code,
}

impl ItemKind {
    /// The kind of content peers are asked for.
    pub const fn content_kind(&self) -> ContentKind {
        match self {
            Self::AccountNode | Self::StorageNode => ContentKind::Node,
            Self::Code => ContentKind::Code,
        }
    }
}

/// A hash that still has to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    /// Hash of the content.
    pub hash: B256,
    /// Path at which the content was discovered.
    pub path: SyncPath,
    /// Hash of the node that referenced the content, zero for roots.
    pub parent: B256,
    /// What the content is.
    pub kind: ItemKind,
}

/// Items handed out for a single request.
///
/// All items of a batch have the same [`ContentKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    kind: ContentKind,
    items: Vec<PendingItem>,
}

impl Batch {
    /// Content kind of all items.
    pub const fn kind(&self) -> ContentKind {
        self.kind
    }

    /// The items, oldest first.
    pub fn items(&self) -> &[PendingItem] {
        &self.items
    }

    /// Hashes of all items in order.
    pub fn hashes(&self) -> Vec<B256> {
        self.items.iter().map(|item| item.hash).collect()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing was eligible.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consumes the batch.
    pub fn into_items(self) -> Vec<PendingItem> {
        self.items
    }
}

/// Overall state of a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Content is still missing or in flight.
    Running,
    /// Everything reachable from the roots is committed.
    Complete,
    /// Verified content could not be decoded.
    Aborted(SyncError),
}

impl SyncStatus {
    /// Returns `true` if the sync can't make any more progress.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Totals of everything committed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Trie nodes committed.
    pub nodes: usize,
    /// Code blobs committed.
    pub codes: usize,
    /// Bytes committed.
    pub bytes: usize,
}

#[derive(Debug)]
struct Entry {
    item: PendingItem,
    /// Insertion order, kept across requeues.
    seq: u64,
    dispatched: bool,
}

/// Schedules the download of a state trie and everything reachable from it.
///
/// Every hash has at most one entry, which is either missing or dispatched. Missing hashes are
/// handed out oldest first by [`Scheduler::next_batch`]. Delivered content is verified, staged
/// and decoded by [`Scheduler::commit`], which schedules everything the content references.
/// Staged content reaches the durable store only through [`Scheduler::flush`].
#[derive(Debug)]
pub struct Scheduler<S, D = AccountLeafDecoder> {
    store: S,
    decoder: D,
    filter: Arc<SkipFilter>,
    staging: StagingStore,
    items: HashMap<B256, Entry>,
    missing_nodes: BTreeMap<u64, B256>,
    missing_codes: BTreeMap<u64, B256>,
    next_seq: u64,
    in_flight: usize,
    seeded: bool,
    aborted: Option<SyncError>,
    stats: CommitStats,
    metrics: SyncMetrics,
}

impl<S: StateStore> Scheduler<S> {
    /// Creates a scheduler decoding account leaves with the [`AccountLeafDecoder`].
    pub fn with_store(store: S, filter: Arc<SkipFilter>) -> Self {
        Self::new(store, AccountLeafDecoder, filter)
    }
}

impl<S, D> Scheduler<S, D>
where
    S: StateStore,
    D: LeafDecoder,
{
    /// Creates a new scheduler.
    pub fn new(store: S, decoder: D, filter: Arc<SkipFilter>) -> Self {
        Self {
            store,
            decoder,
            filter,
            staging: StagingStore::default(),
            items: HashMap::new(),
            missing_nodes: BTreeMap::new(),
            missing_codes: BTreeMap::new(),
            next_seq: 0,
            in_flight: 0,
            seeded: false,
            aborted: None,
            stats: CommitStats::default(),
            metrics: SyncMetrics::default(),
        }
    }

    /// Sets the metrics.
    pub fn with_metrics(mut self, metrics: SyncMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Adds the root of the account trie.
    ///
    /// The empty trie root has nothing to download. Fails once the sync reached a terminal
    /// state.
    pub fn add_root(&mut self, root: B256) -> SyncResult<()> {
        if let Some(err) = &self.aborted {
            return Err(err.clone())
        }
        if self.is_complete() {
            return Err(SyncError::AlreadyComplete)
        }
        self.seeded = true;
        if !is_empty_root(&root) {
            debug!(target: "sync::trie", %root, "Adding state root");
            self.schedule(root, SyncPath::root(), B256::ZERO, ItemKind::AccountNode);
        }
        Ok(())
    }

    /// Adds the root of a storage trie. Returns `true` if it was scheduled.
    pub fn add_sub_trie(&mut self, root: B256, path: SyncPath, parent: B256) -> bool {
        if is_empty_root(&root) {
            return false
        }
        self.schedule(root, path, parent, ItemKind::StorageNode)
    }

    /// Adds a code hash. Returns `true` if it was scheduled.
    pub fn add_code_entry(&mut self, code_hash: B256, path: SyncPath, parent: B256) -> bool {
        if is_empty_code_hash(&code_hash) {
            return false
        }
        self.schedule(code_hash, path, parent, ItemKind::Code)
    }

    fn schedule(&mut self, hash: B256, path: SyncPath, parent: B256, kind: ItemKind) -> bool {
        if self.items.contains_key(&hash) {
            self.metrics.duplicate_items.increment(1);
            return false
        }
        if self.is_known(&hash) {
            trace!(target: "sync::trie", %hash, "Skipping known content");
            self.metrics.known_items.increment(1);
            return false
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        match kind.content_kind() {
            ContentKind::Node => self.missing_nodes.insert(seq, hash),
            ContentKind::Code => self.missing_codes.insert(seq, hash),
        };
        trace!(target: "sync::trie", %hash, %path, ?kind, "Scheduled");
        let item = PendingItem { hash, path, parent, kind };
        self.items.insert(hash, Entry { item, seq, dispatched: false });
        self.update_gauges();
        true
    }

    /// Returns `true` if the content is staged or confirmed to be in the durable store.
    fn is_known(&self, hash: &B256) -> bool {
        if self.staging.contains(hash) {
            return true
        }
        if !self.filter.might_have(hash) {
            return false
        }
        match self.store.contains(hash) {
            Ok(true) => true,
            Ok(false) => {
                self.metrics.filter_false_positives.increment(1);
                false
            }
            Err(err) => {
                debug!(target: "sync::trie", %hash, %err, "Failed to confirm skip filter hit");
                false
            }
        }
    }

    /// Takes up to `max_items` missing items, oldest first, and marks them dispatched.
    ///
    /// Returns an empty batch if nothing is missing. The batch holds either nodes or code,
    /// whichever kind has the oldest missing item.
    pub fn next_batch(&mut self, max_items: usize) -> Batch {
        if self.aborted.is_some() || max_items == 0 {
            return Batch::default()
        }
        let oldest_node = self.missing_nodes.first_key_value().map(|(seq, _)| *seq);
        let oldest_code = self.missing_codes.first_key_value().map(|(seq, _)| *seq);
        let kind = match (oldest_node, oldest_code) {
            (Some(node), Some(code)) if code < node => ContentKind::Code,
            (Some(_), _) => ContentKind::Node,
            (None, Some(_)) => ContentKind::Code,
            (None, None) => return Batch::default(),
        };
        let queue = match kind {
            ContentKind::Node => &mut self.missing_nodes,
            ContentKind::Code => &mut self.missing_codes,
        };

        let mut items = Vec::with_capacity(max_items.min(queue.len()));
        while items.len() < max_items {
            let Some((_, hash)) = queue.pop_first() else { break };
            if let Some(entry) = self.items.get_mut(&hash) {
                entry.dispatched = true;
                items.push(entry.item.clone());
            }
        }
        self.in_flight += items.len();
        self.update_gauges();
        Batch { kind, items }
    }

    /// Verifies and commits delivered content.
    ///
    /// Content that doesn't hash to `hash` is rejected and the item becomes missing again.
    /// Otherwise the content is staged and every hash it references is scheduled. A node that
    /// can't be decoded aborts the sync.
    pub fn commit(&mut self, hash: B256, data: Bytes) -> SyncResult<()> {
        if let Some(err) = &self.aborted {
            return Err(err.clone())
        }
        if !self.items.get(&hash).is_some_and(|entry| entry.dispatched) {
            self.metrics.unrequested_deliveries.increment(1);
            return Err(SyncError::NotRequested(hash))
        }

        let got = keccak256(&data);
        if got != hash {
            self.metrics.hash_mismatches.increment(1);
            self.requeue([hash]);
            return Err(SyncError::HashMismatch(GotExpected::new(got, hash)))
        }

        let Some(Entry { item, .. }) = self.items.remove(&hash) else {
            return Err(SyncError::NotRequested(hash))
        };
        self.in_flight -= 1;
        self.stats.bytes += data.len();
        self.metrics.bytes_committed.increment(data.len() as u64);

        if item.kind == ItemKind::Code {
            self.stats.codes += 1;
            self.metrics.codes_committed.increment(1);
        } else {
            self.stats.nodes += 1;
            self.metrics.nodes_committed.increment(1);
            if let Err(error) = self.schedule_children(&item, &data) {
                self.staging.insert(hash, data);
                return Err(self.abort(hash, error))
            }
        }
        trace!(target: "sync::trie", %hash, kind = ?item.kind, "Committed");
        self.staging.insert(hash, data);
        self.update_gauges();
        Ok(())
    }

    fn schedule_children(&mut self, item: &PendingItem, data: &[u8]) -> Result<(), DecodeError> {
        for child in node_children(data, &item.path)? {
            match child {
                NodeChild::Hash { path, hash } => {
                    self.schedule(hash, path, item.hash, item.kind);
                }
                NodeChild::Value { path, value } => {
                    if item.kind != ItemKind::AccountNode {
                        continue
                    }
                    let refs = self.decoder.decode(&value)?;
                    self.add_sub_trie(refs.storage_root, path.clone(), item.hash);
                    self.add_code_entry(refs.code_hash, path, item.hash);
                }
            }
        }
        Ok(())
    }

    fn abort(&mut self, hash: B256, error: DecodeError) -> SyncError {
        error!(target: "sync::trie", %hash, %error, "Failed to decode verified content, aborting sync");
        let err = SyncError::DecodeFailure { hash, error };
        self.aborted = Some(err.clone());
        self.update_gauges();
        err
    }

    /// Returns dispatched items to the missing set, keeping their original order.
    ///
    /// Hashes that are not dispatched are ignored. Returns the number of requeued items.
    pub fn requeue(&mut self, hashes: impl IntoIterator<Item = B256>) -> usize {
        let mut requeued = 0;
        for hash in hashes {
            let Some(entry) = self.items.get_mut(&hash) else { continue };
            if !entry.dispatched {
                continue
            }
            entry.dispatched = false;
            match entry.item.kind.content_kind() {
                ContentKind::Node => self.missing_nodes.insert(entry.seq, hash),
                ContentKind::Code => self.missing_codes.insert(entry.seq, hash),
            };
            requeued += 1;
        }
        self.in_flight -= requeued;
        self.update_gauges();
        requeued
    }

    /// Returns every dispatched item to the missing set.
    pub fn reset_in_flight(&mut self) -> usize {
        let dispatched = self
            .items
            .iter()
            .filter_map(|(hash, entry)| entry.dispatched.then_some(*hash))
            .collect::<Vec<_>>();
        self.requeue(dispatched)
    }

    /// Number of missing items.
    pub fn pending(&self) -> usize {
        self.missing_nodes.len() + self.missing_codes.len()
    }

    /// Number of dispatched items.
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Returns `true` once a root was added.
    pub const fn is_seeded(&self) -> bool {
        self.seeded
    }

    fn is_complete(&self) -> bool {
        self.seeded && self.pending() == 0 && self.in_flight == 0
    }

    /// Returns the current status.
    pub fn status(&self) -> SyncStatus {
        if let Some(err) = &self.aborted {
            SyncStatus::Aborted(err.clone())
        } else if self.is_complete() {
            SyncStatus::Complete
        } else {
            SyncStatus::Running
        }
    }

    /// Writes the staged content to the durable store and records it in the skip filter.
    /// Returns the number of written entries.
    pub fn flush(&mut self) -> SyncResult<usize> {
        let hashes = self.staging.iter().map(|(hash, _)| *hash).collect::<Vec<_>>();
        let written = self.staging.flush_into(&self.store)?;
        for hash in &hashes {
            self.filter.add(hash);
        }
        info!(target: "sync::trie", written, "Flushed staged state");
        Ok(written)
    }

    /// Returns the pending item for the hash, missing or dispatched.
    pub fn item(&self, hash: &B256) -> Option<&PendingItem> {
        self.items.get(hash).map(|entry| &entry.item)
    }

    /// Returns `true` if the hash is dispatched.
    pub fn is_dispatched(&self, hash: &B256) -> bool {
        self.items.get(hash).is_some_and(|entry| entry.dispatched)
    }

    /// Totals of everything committed.
    pub const fn stats(&self) -> CommitStats {
        self.stats
    }

    /// The staged content.
    pub const fn staging(&self) -> &StagingStore {
        &self.staging
    }

    /// The skip filter.
    pub const fn filter(&self) -> &Arc<SkipFilter> {
        &self.filter
    }

    /// The durable store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    fn update_gauges(&self) {
        self.metrics.pending.set(self.pending() as f64);
        self.metrics.in_flight.set(self.in_flight as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        filter::SkipFilterConfig,
        test_utils::{encode_leaf, FixtureAccount, MemoryStore, TrieFixture},
    };
    use assert_matches::assert_matches;
    use hyk_sync_primitives::{EMPTY_ROOT_HASH, KECCAK_EMPTY};
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn filter() -> Arc<SkipFilter> {
        Arc::new(SkipFilter::new(SkipFilterConfig { bits: 1 << 16, hashes: 4 }))
    }

    fn scheduler(store: MemoryStore) -> Scheduler<MemoryStore> {
        Scheduler::with_store(store, filter())
    }

    fn sync_all(scheduler: &mut Scheduler<MemoryStore>, fixture: &TrieFixture) {
        loop {
            let batch = scheduler.next_batch(3);
            if batch.is_empty() {
                break
            }
            for item in batch.into_items() {
                scheduler.commit(item.hash, fixture.get(&item.hash).unwrap()).unwrap();
            }
        }
    }

    #[test]
    fn one_code_item_for_two_accounts() {
        hyk_tracing::init_test_tracing();
        let code = Bytes::from_static(b"\x60\x00\x60\x00");
        let fixture = TrieFixture::new(vec![
            FixtureAccount::plain(0),
            FixtureAccount::plain(1).with_code(code.clone()),
        ]);
        let mut scheduler = scheduler(MemoryStore::default());
        scheduler.add_root(fixture.root()).unwrap();

        let batch = scheduler.next_batch(16);
        assert_eq!(batch.hashes(), vec![fixture.root()]);
        scheduler.commit(fixture.root(), fixture.get(&fixture.root()).unwrap()).unwrap();

        let leaves = scheduler.next_batch(16);
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves.kind(), ContentKind::Node);
        assert!(leaves.items().iter().all(|item| item.kind == ItemKind::AccountNode));
        for hash in leaves.hashes() {
            scheduler.commit(hash, fixture.get(&hash).unwrap()).unwrap();
        }

        assert_eq!(scheduler.pending(), 1);
        let codes = scheduler.next_batch(16);
        assert_eq!(codes.kind(), ContentKind::Code);
        assert_eq!(codes.hashes(), vec![keccak256(&code)]);
        assert_eq!(codes.items()[0].kind, ItemKind::Code);

        scheduler.commit(keccak256(&code), code).unwrap();
        assert_eq!(scheduler.status(), SyncStatus::Complete);
    }

    #[test]
    fn full_sync_flushes_everything() {
        let shared = Bytes::from_static(b"shared code");
        let fixture = TrieFixture::new(vec![
            FixtureAccount::plain(0).with_code(shared.clone()),
            FixtureAccount::plain(1).with_code(shared),
            FixtureAccount::plain(2).with_storage(vec![
                Bytes::from_static(b"one"),
                Bytes::from_static(b"two"),
                Bytes::from_static(b"three"),
            ]),
            FixtureAccount::plain(3).with_storage(vec![Bytes::from_static(b"single")]),
            FixtureAccount::plain(4),
        ]);
        let store = MemoryStore::default();
        let mut scheduler = scheduler(store.clone());
        scheduler.add_root(fixture.root()).unwrap();
        sync_all(&mut scheduler, &fixture);

        assert_eq!(scheduler.status(), SyncStatus::Complete);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.in_flight(), 0);
        assert_eq!(
            scheduler.stats(),
            CommitStats {
                nodes: fixture.nodes().len(),
                codes: 1,
                bytes: fixture.content().values().map(|data| data.len()).sum(),
            }
        );

        // nothing reaches the store or the filter before the flush
        assert!(store.is_empty());
        assert!(!scheduler.filter().might_have(&fixture.root()));
        assert_eq!(scheduler.flush().unwrap(), fixture.len());
        assert_eq!(store.content(), fixture.content());
        assert!(scheduler.staging().is_empty());
        assert!(fixture.content().keys().all(|hash| scheduler.filter().might_have(hash)));
    }

    #[test]
    fn failed_flush_leaves_filter_untouched() {
        let fixture = TrieFixture::new(vec![FixtureAccount::plain(0)]);
        let store = MemoryStore::default();
        let mut scheduler = scheduler(store.clone());
        scheduler.add_root(fixture.root()).unwrap();
        sync_all(&mut scheduler, &fixture);

        store.fail_writes(true);
        assert_matches!(scheduler.flush(), Err(SyncError::Store(_)));
        assert!(!scheduler.filter().might_have(&fixture.root()));
        assert_eq!(scheduler.staging().len(), 1);

        store.fail_writes(false);
        assert_eq!(scheduler.flush().unwrap(), 1);
        assert!(scheduler.filter().might_have(&fixture.root()));
    }

    #[test]
    fn duplicate_registrations_yield_one_item() {
        let mut scheduler = scheduler(MemoryStore::default());
        let root = keccak256(b"storage root");
        let code = keccak256(b"code");

        assert!(scheduler.add_sub_trie(root, SyncPath::root(), B256::ZERO));
        assert!(!scheduler.add_sub_trie(root, SyncPath::new(vec![1]), B256::ZERO));
        assert!(scheduler.add_code_entry(code, SyncPath::root(), B256::ZERO));
        assert!(!scheduler.add_code_entry(code, SyncPath::root(), B256::ZERO));
        assert_eq!(scheduler.pending(), 2);

        // still a single item while dispatched
        let batch = scheduler.next_batch(1);
        assert_eq!(batch.hashes(), vec![root]);
        assert!(!scheduler.add_sub_trie(root, SyncPath::root(), B256::ZERO));
        assert_eq!(scheduler.pending() + scheduler.in_flight(), 2);
    }

    #[test]
    fn empty_hashes_are_never_scheduled() {
        let mut scheduler = scheduler(MemoryStore::default());
        assert!(!scheduler.add_code_entry(KECCAK_EMPTY, SyncPath::root(), B256::ZERO));
        assert!(!scheduler.add_code_entry(B256::ZERO, SyncPath::root(), B256::ZERO));
        assert!(!scheduler.add_sub_trie(EMPTY_ROOT_HASH, SyncPath::root(), B256::ZERO));
        assert!(!scheduler.add_sub_trie(B256::ZERO, SyncPath::root(), B256::ZERO));
        assert_eq!(scheduler.pending(), 0);

        scheduler.add_root(EMPTY_ROOT_HASH).unwrap();
        assert_eq!(scheduler.status(), SyncStatus::Complete);
        assert_matches!(scheduler.add_root(keccak256(b"late")), Err(SyncError::AlreadyComplete));
    }

    #[test]
    fn hash_mismatch_is_rejected() {
        let fixture = TrieFixture::new(vec![FixtureAccount::plain(0), FixtureAccount::plain(1)]);
        let root = fixture.root();
        let mut scheduler = scheduler(MemoryStore::default());
        scheduler.add_root(root).unwrap();
        scheduler.next_batch(1);

        let bogus = Bytes::from_static(b"bogus");
        assert_matches!(
            scheduler.commit(root, bogus.clone()),
            Err(SyncError::HashMismatch(GotExpected { got, expected })) if got == keccak256(&bogus) && expected == root
        );
        assert!(scheduler.staging().is_empty());
        assert!(!scheduler.filter().might_have(&root));
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.in_flight(), 0);
        assert!(!scheduler.is_dispatched(&root));

        // it can be requested again and committed
        assert_eq!(scheduler.next_batch(1).hashes(), vec![root]);
        scheduler.commit(root, fixture.get(&root).unwrap()).unwrap();
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn unrequested_content_is_rejected() {
        let fixture = TrieFixture::new(vec![FixtureAccount::plain(0)]);
        let root = fixture.root();
        let data = fixture.get(&root).unwrap();
        let mut scheduler = scheduler(MemoryStore::default());

        assert_matches!(scheduler.commit(root, data.clone()), Err(SyncError::NotRequested(_)));
        scheduler.add_root(root).unwrap();
        // missing but not dispatched
        assert_matches!(scheduler.commit(root, data.clone()), Err(SyncError::NotRequested(_)));

        scheduler.next_batch(1);
        scheduler.commit(root, data.clone()).unwrap();
        assert_matches!(scheduler.commit(root, data), Err(SyncError::NotRequested(_)));
        assert_eq!(scheduler.staging().len(), 1);
    }

    #[test]
    fn requeued_items_keep_their_position() {
        let mut scheduler = scheduler(MemoryStore::default());
        let [a, b, c, d] = [b"a", b"b", b"c", b"d"].map(keccak256);
        for hash in [a, b, c] {
            scheduler.add_code_entry(hash, SyncPath::root(), B256::ZERO);
        }

        assert_eq!(scheduler.next_batch(2).hashes(), vec![a, b]);
        assert_eq!(scheduler.requeue([a, d]), 1);
        scheduler.add_code_entry(d, SyncPath::root(), B256::ZERO);

        assert_eq!(scheduler.next_batch(10).hashes(), vec![a, c, d]);
        assert_eq!(scheduler.in_flight(), 4);
        assert_eq!(scheduler.reset_in_flight(), 4);
        assert_eq!(scheduler.in_flight(), 0);
        assert_eq!(scheduler.next_batch(10).hashes(), vec![a, b, c, d]);
    }

    #[test]
    fn batches_hold_one_content_kind() {
        let mut scheduler = scheduler(MemoryStore::default());
        let node = keccak256(b"node");
        let code = keccak256(b"code");
        let later = keccak256(b"later node");
        scheduler.add_sub_trie(node, SyncPath::root(), B256::ZERO);
        scheduler.add_code_entry(code, SyncPath::root(), B256::ZERO);
        scheduler.add_sub_trie(later, SyncPath::root(), B256::ZERO);

        let first = scheduler.next_batch(10);
        assert_eq!(first.kind(), ContentKind::Node);
        assert_eq!(first.hashes(), vec![node, later]);
        let second = scheduler.next_batch(10);
        assert_eq!(second.kind(), ContentKind::Code);
        assert_eq!(second.hashes(), vec![code]);
        assert!(scheduler.next_batch(10).is_empty());
    }

    #[test]
    fn undecodable_leaf_aborts() {
        let leaf = encode_leaf(&[0x1; 64], b"garbage");
        let root = keccak256(&leaf);
        let store = MemoryStore::default();
        let mut scheduler = scheduler(store.clone());
        scheduler.add_root(root).unwrap();
        scheduler.next_batch(1);

        let err = scheduler.commit(root, leaf).unwrap_err();
        assert_matches!(&err, SyncError::DecodeFailure { hash, error: DecodeError::Rlp(_) } if *hash == root);
        assert!(err.is_fatal());
        assert_eq!(scheduler.status(), SyncStatus::Aborted(err.clone()));
        assert!(scheduler.status().is_terminal());

        assert!(scheduler.next_batch(10).is_empty());
        assert_eq!(scheduler.add_root(keccak256(b"other")), Err(err.clone()));
        assert_eq!(scheduler.commit(keccak256(b"x"), Bytes::from_static(b"x")), Err(err));

        // verified content is kept but never written
        assert_eq!(scheduler.staging().len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn malformed_node_aborts() {
        let raw = Bytes::from_static(b"\x83abc");
        let root = keccak256(&raw);
        let mut scheduler = scheduler(MemoryStore::default());
        scheduler.add_root(root).unwrap();
        scheduler.next_batch(1);
        assert_matches!(
            scheduler.commit(root, raw),
            Err(SyncError::DecodeFailure { error: DecodeError::NotAList, .. })
        );
    }

    #[test]
    fn stored_content_is_skipped() {
        let fixture = TrieFixture::new(vec![
            FixtureAccount::plain(0).with_code(Bytes::from_static(b"code")),
            FixtureAccount::plain(1),
        ]);
        let store = MemoryStore::with_content(fixture.content());
        let filter = filter();
        for hash in fixture.content().keys() {
            filter.add(hash);
        }

        let mut scheduler = Scheduler::with_store(store, filter);
        scheduler.add_root(fixture.root()).unwrap();
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.status(), SyncStatus::Complete);
    }

    #[test]
    fn filter_false_positive_is_scheduled() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let root = keccak256(b"root");

        metrics::with_local_recorder(&recorder, || {
            let filter = filter();
            filter.add(&root);
            // `Default` caches its handles, fresh ones are bound to the local recorder
            let metrics = SyncMetrics::new_with_labels(Vec::<metrics::Label>::new());
            let mut scheduler =
                Scheduler::with_store(MemoryStore::default(), filter).with_metrics(metrics);
            scheduler.add_root(root).unwrap();
            assert_eq!(scheduler.pending(), 1);
        });

        let false_positives = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find_map(|(key, _, _, value)| {
                key.key().name().ends_with("filter_false_positives").then_some(value)
            });
        assert_eq!(false_positives, Some(DebugValue::Counter(1)));
    }
}
