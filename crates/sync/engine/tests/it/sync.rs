use alloy_primitives::{keccak256, Bytes, B256};
use assert_matches::assert_matches;
use hyk_net_fetch::{
    test_utils::{PeerBehaviour, TestStateClient},
    PeerSet, ServeCapability,
};
use hyk_state_sync::{StateSync, StateSyncConfig, StateSyncError};
use hyk_sync_primitives::{PeerId, EMPTY_ROOT_HASH};
use hyk_trie_sync::{
    test_utils::{FixtureAccount, MemoryStore, TrieFixture},
    DecodeError, Scheduler, SkipFilter, SkipFilterConfig, SyncError, SyncStatus,
};
use std::{sync::Arc, time::Duration};

pub(crate) fn accounts(count: u64) -> Vec<FixtureAccount> {
    (0..count)
        .map(|idx| match idx % 3 {
            0 => FixtureAccount::plain(idx).with_code(vec![0x60, idx as u8, 0x56]),
            1 => FixtureAccount::plain(idx).with_storage(vec![
                Bytes::from(vec![0x01; 40]),
                Bytes::from(vec![idx as u8; 3]),
            ]),
            _ => FixtureAccount::plain(idx),
        })
        .collect()
}

pub(crate) fn test_config() -> StateSyncConfig {
    let mut config = StateSyncConfig {
        workers: 2,
        batch_size: 4,
        retry_backoff: Duration::from_millis(10),
        skip_filter: SkipFilterConfig { bits: 1 << 16, hashes: 4 },
        ..Default::default()
    };
    config.retrieve.min_timeout = Duration::from_millis(200);
    config
}

pub(crate) fn new_sync(
    config: StateSyncConfig,
    store: MemoryStore,
    client: TestStateClient,
) -> StateSync<MemoryStore, TestStateClient> {
    let filter = Arc::new(SkipFilter::new(config.skip_filter));
    let scheduler = Scheduler::with_store(store, filter);
    let peers = PeerSet::new(config.peers.clone());
    StateSync::new(config, scheduler, client, peers)
}

#[tokio::test(start_paused = true)]
async fn full_sync_with_specialised_peers() {
    hyk_tracing::init_test_tracing();
    let fixture = TrieFixture::new(accounts(9));
    let store = MemoryStore::default();
    let client = TestStateClient::with_content(fixture.content());
    let sync = new_sync(test_config(), store.clone(), client.clone());

    let nodes = PeerId::with_last_byte(1);
    let codes = PeerId::with_last_byte(2);
    let full = PeerId::with_last_byte(3);
    sync.peers().add_peer(nodes, ServeCapability::Nodes, 0);
    sync.peers().add_peer(codes, ServeCapability::Code, 0);
    sync.peers().add_peer(full, ServeCapability::Full, 0);

    sync.add_root(fixture.root()).unwrap();
    let stats = sync.run().await.unwrap();

    assert_eq!(stats.nodes, fixture.nodes().len());
    assert_eq!(stats.codes, fixture.codes().len());
    assert_eq!(stats.flushed, fixture.len());
    assert_eq!(store.content(), fixture.content());
    assert_eq!(store.batches(), 1);
    assert_eq!(sync.status(), SyncStatus::Complete);
    assert_eq!(sync.pending(), 0);
    assert_eq!(sync.in_flight(), 0);

    // nodes were never asked from the code peer and vice versa
    for (peer_id, request) in client.requests() {
        for hash in &request.hashes {
            if peer_id == nodes {
                assert!(fixture.nodes().contains_key(hash));
            } else if peer_id == codes {
                assert!(fixture.codes().contains_key(hash));
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn empty_root_completes_without_requests() {
    hyk_tracing::init_test_tracing();
    let store = MemoryStore::default();
    let client = TestStateClient::default();
    let sync = new_sync(test_config(), store.clone(), client.clone());

    sync.add_root(EMPTY_ROOT_HASH).unwrap();
    let stats = sync.run().await.unwrap();

    assert_eq!(stats.flushed, 0);
    assert!(client.requests().is_empty());
    assert!(store.is_empty());
    assert_matches!(sync.add_root(B256::repeat_byte(1)), Err(SyncError::AlreadyComplete));
}

#[tokio::test(start_paused = true)]
async fn run_without_root() {
    hyk_tracing::init_test_tracing();
    let sync = new_sync(test_config(), MemoryStore::default(), TestStateClient::default());
    assert_matches!(sync.run().await, Err(StateSyncError::NoRoot));
}

#[tokio::test(start_paused = true)]
async fn corrupt_peer_is_penalized() {
    hyk_tracing::init_test_tracing();
    let fixture = TrieFixture::new(accounts(6));
    let store = MemoryStore::default();
    let client = TestStateClient::with_content(fixture.content());
    let config = StateSyncConfig { workers: 1, ..test_config() };
    let sync = new_sync(config, store.clone(), client.clone());

    let corrupt = PeerId::with_last_byte(1);
    let honest = PeerId::with_last_byte(2);
    client.set_behaviour(corrupt, PeerBehaviour::Corrupt);
    // the corrupt peer is picked first, being the only one
    sync.peers().add_peer(corrupt, ServeCapability::Full, 0);
    sync.add_root(fixture.root()).unwrap();

    let (result, _) = tokio::join!(sync.run(), async {
        while client.requests_to(&corrupt) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        sync.peers().add_peer(honest, ServeCapability::Full, 0);
    });

    result.unwrap();
    assert_eq!(store.content(), fixture.content());

    let info = sync.peers().peer(&corrupt).unwrap();
    assert!(info.reputation < 0);
    assert!(info.failures >= 1);
    assert!(client.requests_to(&honest) > 0);
}

#[tokio::test(start_paused = true)]
async fn stalls_when_nobody_serves() {
    hyk_tracing::init_test_tracing();
    let fixture = TrieFixture::new(accounts(3));
    let store = MemoryStore::default();
    let client = TestStateClient::with_content(fixture.content());
    let config = StateSyncConfig { workers: 1, max_stalled_rounds: 3, ..test_config() };
    let sync = new_sync(config, store.clone(), client.clone());

    for id in 1..=2 {
        let peer_id = PeerId::with_last_byte(id);
        client.set_behaviour(peer_id, PeerBehaviour::Missing);
        sync.peers().add_peer(peer_id, ServeCapability::Full, 0);
    }
    sync.add_root(fixture.root()).unwrap();

    assert_matches!(sync.run().await, Err(StateSyncError::Stalled { rounds: 3 }));
    assert_eq!(sync.pending(), 1);
    assert_eq!(sync.in_flight(), 0);
    assert_eq!(sync.status(), SyncStatus::Running);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalls_when_every_peer_is_banned() {
    hyk_tracing::init_test_tracing();
    let fixture = TrieFixture::new(accounts(3));
    let store = MemoryStore::default();
    let client = TestStateClient::with_content(fixture.content());
    let config = StateSyncConfig { workers: 1, max_stalled_rounds: 6, ..test_config() };
    let sync = new_sync(config, store.clone(), client.clone());

    let corrupt = PeerId::with_last_byte(1);
    client.set_behaviour(corrupt, PeerBehaviour::Corrupt);
    sync.peers().add_peer(corrupt, ServeCapability::Full, 0);
    sync.add_root(fixture.root()).unwrap();

    // four bad deliveries ban the peer, the remaining rounds find nobody to ask
    assert_matches!(sync.run().await, Err(StateSyncError::Stalled { rounds: 6 }));
    assert!(sync.peers().peer(&corrupt).unwrap().is_banned());
    assert_eq!(client.requests_to(&corrupt), 4);
    assert_eq!(sync.in_flight(), 0);
    assert_eq!(sync.pending(), 1);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn undecodable_node_aborts() {
    hyk_tracing::init_test_tracing();
    // extension node without a child
    let garbage = Bytes::from_static(&[0xc2, 0x00, 0x80]);
    let root = keccak256(&garbage);
    let store = MemoryStore::default();
    let client = TestStateClient::with_content([(root, garbage)]);
    let sync = new_sync(test_config(), store.clone(), client);
    sync.peers().add_peer(PeerId::with_last_byte(1), ServeCapability::Full, 0);

    sync.add_root(root).unwrap();
    let err = sync.run().await.unwrap_err();

    assert_matches!(
        err,
        StateSyncError::Aborted(SyncError::DecodeFailure { hash, .. }) if hash == root
    );
    assert_matches!(sync.status(), SyncStatus::Aborted(_));
    assert!(store.is_empty());
    assert_matches!(
        sync.add_root(root),
        Err(SyncError::DecodeFailure { error: DecodeError::InvalidReference(0), .. })
    );
}

#[tokio::test(start_paused = true)]
async fn waits_for_peers_to_join() {
    hyk_tracing::init_test_tracing();
    let fixture = TrieFixture::new(accounts(4));
    let store = MemoryStore::default();
    let client = TestStateClient::with_content(fixture.content());
    let sync = new_sync(test_config(), store.clone(), client.clone());
    sync.add_root(fixture.root()).unwrap();

    let (result, _) = tokio::join!(sync.run(), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(client.requests().is_empty());
        sync.peers().add_peer(PeerId::with_last_byte(7), ServeCapability::Full, 0);
    });

    result.unwrap();
    assert_eq!(store.content(), fixture.content());
}

#[tokio::test(start_paused = true)]
async fn skips_content_already_stored() {
    hyk_tracing::init_test_tracing();
    let fixture = TrieFixture::new(accounts(6));
    // codes were stored and recorded in the filter by an earlier run
    let store = MemoryStore::with_content(fixture.codes().clone());
    let client = TestStateClient::with_content(fixture.content());
    let sync = new_sync(test_config(), store.clone(), client.clone());
    sync.with_scheduler(|scheduler| {
        for hash in fixture.codes().keys() {
            scheduler.filter().add(hash);
        }
    });
    sync.peers().add_peer(PeerId::with_last_byte(1), ServeCapability::Full, 0);

    sync.add_root(fixture.root()).unwrap();
    let stats = sync.run().await.unwrap();

    assert_eq!(stats.codes, 0);
    assert_eq!(stats.flushed, fixture.nodes().len());
    assert_eq!(store.content(), fixture.content());
    for (_, request) in client.requests() {
        assert!(request.hashes.iter().all(|hash| !fixture.codes().contains_key(hash)));
    }
}
