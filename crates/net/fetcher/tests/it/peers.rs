use crate::utils::{spawn_fetcher, test_config, WAIT};
use assert_matches::assert_matches;
use ptn_fetcher::{
    test_utils::{collect_for, collect_imports, generate_chain, imported, FetcherEvent, TestPeer},
    FetcherError,
};
use ptn_primitives::{ChainIndex, PeerId, Unit};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(flavor = "multi_thread")]
async fn invalid_header_drops_peer_once() {
    let mut fetcher = spawn_fetcher(test_config());
    let unit = generate_chain(&fetcher.dag.genesis(), 1).remove(0);
    let peer = TestPeer::new(PeerId::with_last_byte(1), &[unit.clone()]);
    fetcher.dag.mark_invalid(unit.hash());

    peer.announce(&fetcher.handle, &unit).unwrap();
    let events = collect_for(&mut fetcher.events, Duration::from_millis(400)).await;

    assert!(imported(&events).is_empty());
    assert_eq!(peer.header_requests(), 1);
    assert_eq!(peer.body_requests(), 0);
    assert_eq!(fetcher.dag.dropped_peers(), vec![peer.peer_id()]);
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn mismatched_chain_index_drops_peer() {
    let mut fetcher = spawn_fetcher(test_config().with_hash_limit(1));
    // carries transactions, so a body would be requested next
    let unit = generate_chain(&fetcher.dag.genesis(), 1).remove(0);
    let peer = TestPeer::new(PeerId::with_last_byte(1), &[unit.clone()]);

    let index = unit.chain_index();
    let wrong = ChainIndex::new(index.asset_id, index.index + 1);
    peer.announce_hash(&fetcher.handle, unit.hash(), wrong, Instant::now()).unwrap();
    let events = collect_for(&mut fetcher.events, Duration::from_millis(400)).await;

    assert!(imported(&events).is_empty());
    assert!(!events.iter().any(|event| matches!(event, FetcherEvent::Completing(_))));
    assert_eq!(peer.header_requests(), 1);
    assert_eq!(peer.body_requests(), 0);
    assert_eq!(fetcher.dag.dropped_peers(), vec![peer.peer_id()]);

    // the hash was purged and the peer's budget released
    peer.announce(&fetcher.handle, &unit).unwrap();
    let events = collect_imports(&mut fetcher.events, 1, WAIT).await;
    assert_eq!(imported(&events), vec![unit.hash()]);
    assert_eq!(peer.header_requests(), 2);
    assert_eq!(fetcher.dag.dropped_peers(), vec![peer.peer_id()]);
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_pushed_unit_drops_peer() {
    let mut fetcher = spawn_fetcher(test_config());
    let mut unit = generate_chain(&fetcher.dag.genesis(), 1).remove(0);
    let peer = PeerId::with_last_byte(1);

    // body no longer matches the header
    unit.transactions.clear();
    fetcher.handle.enqueue(peer, unit).unwrap();

    let events = collect_for(&mut fetcher.events, Duration::from_millis(200)).await;
    assert!(events.is_empty());
    assert_eq!(fetcher.dag.dropped_peers(), vec![peer]);
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_purges_state() {
    let mut fetcher = spawn_fetcher(test_config());
    let unit = generate_chain(&fetcher.dag.genesis(), 1).remove(0);
    let silent = TestPeer::new(PeerId::with_last_byte(1), &[unit.clone()]).unresponsive();
    let honest = TestPeer::new(PeerId::with_last_byte(2), &[unit.clone()]);

    silent.announce(&fetcher.handle, &unit).unwrap();
    let events = collect_for(&mut fetcher.events, Duration::from_millis(500)).await;
    assert!(events.contains(&FetcherEvent::Fetching(vec![unit.hash()])));
    assert_eq!(silent.header_requests(), 1);

    // the expired request no longer shadows the hash
    honest.announce(&fetcher.handle, &unit).unwrap();
    let events = collect_imports(&mut fetcher.events, 1, WAIT).await;
    assert_eq!(imported(&events), vec![unit.hash()]);
    assert_eq!(honest.header_requests(), 1);
    assert!(fetcher.dag.dropped_peers().is_empty());
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_peer_keeps_other_origins() {
    let config = test_config().with_gather_slack(Duration::from_millis(200));
    let mut fetcher = spawn_fetcher(config);
    let chain = generate_chain(&fetcher.dag.genesis(), 2);
    let (shared, own) = (&chain[0], &chain[1]);
    let leaving = TestPeer::new(PeerId::with_last_byte(1), &chain);
    let staying = TestPeer::new(PeerId::with_last_byte(2), &chain);

    leaving.announce(&fetcher.handle, shared).unwrap();
    leaving.announce(&fetcher.handle, own).unwrap();
    staying.announce(&fetcher.handle, shared).unwrap();
    fetcher.handle.remove_peer(leaving.peer_id()).unwrap();

    let events = collect_imports(&mut fetcher.events, 1, WAIT).await;
    assert_eq!(imported(&events), vec![shared.hash()]);
    assert!(events.contains(&FetcherEvent::Unannounced(own.hash())));
    assert_eq!(leaving.header_requests(), 0);
    assert_eq!(staying.header_requests(), 1);
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unrequested_data_is_returned() {
    let fetcher = spawn_fetcher(test_config());
    let chain = generate_chain(&fetcher.dag.genesis(), 1);
    let peer = PeerId::with_last_byte(1);

    let headers = vec![chain[0].header.clone()];
    let unmatched = fetcher.handle.filter_headers(peer, headers.clone(), Instant::now()).await;
    assert_eq!(unmatched, Ok(headers));

    let bodies = vec![chain[0].transactions.clone()];
    let unmatched = fetcher.handle.filter_bodies(peer, bodies.clone(), Instant::now()).await;
    assert_eq!(unmatched, Ok(bodies));
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stopped_fetcher_rejects_calls() {
    let fetcher = spawn_fetcher(test_config());
    let unit: Unit = generate_chain(&fetcher.dag.genesis(), 1).remove(0);
    let peer = TestPeer::new(PeerId::with_last_byte(1), &[unit.clone()]);

    fetcher.service.stop().await;

    assert_matches!(peer.announce(&fetcher.handle, &unit), Err(FetcherError::Terminated));
    assert_matches!(fetcher.handle.enqueue(peer.peer_id(), unit), Err(FetcherError::Terminated));
    assert_matches!(
        fetcher.handle.filter_headers(peer.peer_id(), vec![], Instant::now()).await,
        Err(FetcherError::Terminated)
    );
}
