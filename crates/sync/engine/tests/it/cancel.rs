use crate::sync::{accounts, new_sync, test_config};
use assert_matches::assert_matches;
use hyk_net_fetch::{
    test_utils::{PeerBehaviour, TestStateClient},
    ServeCapability,
};
use hyk_state_sync::{StateSyncConfig, StateSyncError};
use hyk_sync_primitives::PeerId;
use hyk_trie_sync::{
    test_utils::{FixtureAccount, MemoryStore, TrieFixture},
    SyncStatus,
};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn cancel_returns_requested_items() {
    hyk_tracing::init_test_tracing();
    let fixture = TrieFixture::new((0..9).map(FixtureAccount::plain).collect());
    let store = MemoryStore::default();
    let client = TestStateClient::with_content(fixture.content());
    let config = StateSyncConfig { workers: 3, batch_size: 3, ..test_config() };
    let sync = new_sync(config, store.clone(), client.clone());

    for id in 1..=3 {
        let peer_id = PeerId::with_last_byte(id);
        client.set_behaviour(peer_id, PeerBehaviour::Gated);
        sync.peers().add_peer(peer_id, ServeCapability::Full, 0);
    }

    let root = fixture.root();
    sync.add_root(root).unwrap();
    sync.with_scheduler(|scheduler| {
        let batch = scheduler.next_batch(1);
        assert_eq!(batch.hashes(), vec![root]);
        scheduler.commit(root, fixture.get(&root).unwrap()).unwrap();
    });
    assert_eq!(sync.pending(), 9);

    let handle = sync.handle();
    let (result, _) = tokio::join!(sync.run(), async {
        while sync.in_flight() < 9 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        handle.cancel();
    });

    assert_matches!(result, Err(StateSyncError::Cancelled));
    assert_eq!(sync.in_flight(), 0);
    assert_eq!(sync.pending(), 9);
    assert_eq!(sync.status(), SyncStatus::Running);

    // late responses are ignored
    client.open_gate();
    tokio::time::sleep(Duration::from_millis(10)).await;
    sync.with_scheduler(|scheduler| assert_eq!(scheduler.staging().len(), 1));
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_while_waiting_for_peers() {
    hyk_tracing::init_test_tracing();
    let fixture = TrieFixture::new(accounts(3));
    let sync = new_sync(
        test_config(),
        MemoryStore::default(),
        TestStateClient::with_content(fixture.content()),
    );
    sync.add_root(fixture.root()).unwrap();

    let (result, _) = tokio::join!(sync.run(), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        sync.cancel();
        // cancelling twice is fine
        sync.cancel();
    });

    assert_matches!(result, Err(StateSyncError::Cancelled));
    assert_eq!(sync.pending(), 1);
    assert_eq!(sync.in_flight(), 0);
}
