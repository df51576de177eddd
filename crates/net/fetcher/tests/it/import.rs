use crate::utils::{spawn_fetcher, test_config, WAIT};
use ptn_fetcher::test_utils::{
    collect_for, collect_imports, generate_chain, imported, FetcherEvent, TestPeer,
};
use ptn_primitives::{PeerId, Unit};
use rand::seq::SliceRandom;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(flavor = "multi_thread")]
async fn sequential_announces() {
    let hash_limit = 8;
    let config = test_config().with_hash_limit(hash_limit);
    let mut fetcher = spawn_fetcher(config);
    let chain = generate_chain(&fetcher.dag.genesis(), 4 * hash_limit);
    let peer = TestPeer::new(PeerId::with_last_byte(1), &chain);

    for unit in &chain {
        // already overdue, dispatched right away
        let time = Instant::now() - config.arrive_timeout;
        peer.announce_at(&fetcher.handle, unit, time).unwrap();
        let events = collect_imports(&mut fetcher.events, 1, WAIT).await;
        assert_eq!(imported(&events), vec![unit.hash()]);
    }

    assert_eq!(fetcher.dag.imported(), chain.iter().map(Unit::hash).collect::<Vec<_>>());
    assert_eq!(peer.header_requests(), chain.len());
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_announces_fetch_once() {
    let mut fetcher = spawn_fetcher(test_config());
    let chain = generate_chain(&fetcher.dag.genesis(), 32);
    let first = TestPeer::new(PeerId::with_last_byte(1), &chain);
    let second = TestPeer::new(PeerId::with_last_byte(2), &chain);

    for unit in &chain {
        first.announce(&fetcher.handle, unit).unwrap();
        second.announce(&fetcher.handle, unit).unwrap();
    }
    let events = collect_imports(&mut fetcher.events, chain.len(), WAIT).await;
    assert_eq!(imported(&events).len(), chain.len());

    let with_body = chain.iter().filter(|unit| !unit.transactions.is_empty()).count();
    assert_eq!(first.header_requests() + second.header_requests(), chain.len());
    assert_eq!(first.body_requests() + second.body_requests(), with_body);
    assert_eq!(fetcher.dag.imported(), chain.iter().map(Unit::hash).collect::<Vec<_>>());
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn random_arrival_order() {
    let mut fetcher = spawn_fetcher(test_config());
    let chain = generate_chain(&fetcher.dag.genesis(), 24);
    let peer = TestPeer::new(PeerId::with_last_byte(1), &chain);

    let mut shuffled = chain.clone();
    shuffled.shuffle(&mut rand::thread_rng());
    for unit in &shuffled {
        peer.announce(&fetcher.handle, unit).unwrap();
    }

    let events = collect_imports(&mut fetcher.events, chain.len(), WAIT).await;
    assert_eq!(imported(&events), chain.iter().map(Unit::hash).collect::<Vec<_>>());
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn enqueue_deduplication() {
    let mut fetcher = spawn_fetcher(test_config());
    let unit = generate_chain(&fetcher.dag.genesis(), 1).remove(0);
    let peer = TestPeer::new(PeerId::with_last_byte(1), &[unit.clone()]);

    for _ in 0..3 {
        fetcher.handle.enqueue(peer.peer_id(), unit.clone()).unwrap();
    }
    peer.announce(&fetcher.handle, &unit).unwrap();

    let events = collect_for(&mut fetcher.events, Duration::from_millis(300)).await;
    assert_eq!(imported(&events), vec![unit.hash()]);
    assert_eq!(peer.header_requests(), 0);
    assert_eq!(fetcher.dag.broadcasts(), vec![(unit.hash(), true)]);
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn announce_then_enqueue_imports_once() {
    let mut fetcher = spawn_fetcher(test_config());
    let unit = generate_chain(&fetcher.dag.genesis(), 1).remove(0);
    let peer = TestPeer::new(PeerId::with_last_byte(1), &[unit.clone()]);

    peer.announce(&fetcher.handle, &unit).unwrap();
    for _ in 0..3 {
        fetcher.handle.enqueue(peer.peer_id(), unit.clone()).unwrap();
    }

    let events = collect_for(&mut fetcher.events, Duration::from_millis(300)).await;
    assert_eq!(imported(&events), vec![unit.hash()]);
    assert_eq!(fetcher.dag.imported(), vec![unit.hash()]);
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_units_skip_body_request() {
    let mut fetcher = spawn_fetcher(test_config());
    // only the first unit carries transactions
    let chain = generate_chain(&fetcher.dag.genesis(), 3);
    let peer = TestPeer::new(PeerId::with_last_byte(1), &chain);

    for unit in &chain {
        peer.announce(&fetcher.handle, unit).unwrap();
    }
    let events = collect_imports(&mut fetcher.events, chain.len(), WAIT).await;
    assert_eq!(imported(&events).len(), 3);

    let completing: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            FetcherEvent::Completing(hashes) => Some(hashes.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(completing, vec![chain[0].hash()]);
    assert_eq!(peer.body_requests(), 1);
    fetcher.service.stop().await;
}
