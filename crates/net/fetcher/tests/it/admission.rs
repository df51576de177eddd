use crate::utils::{spawn_fetcher, test_config, WAIT};
use ptn_fetcher::test_utils::{
    collect_for, collect_imports, generate_chain, imported, FetcherEvent, TestPeer,
};
use ptn_primitives::{ChainIndex, PeerId, Unit, UnitHash};
use std::time::Duration;
use tokio::time::Instant;

fn bogus_hash(n: u64) -> UnitHash {
    let mut bytes = [0xaa; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    UnitHash::from(bytes)
}

#[tokio::test(flavor = "multi_thread")]
async fn hash_memory_exhaustion() {
    let hash_limit = 8;
    let mut fetcher = spawn_fetcher(test_config().with_hash_limit(hash_limit));
    let chain = generate_chain(&fetcher.dag.genesis(), 4);
    let honest = TestPeer::new(PeerId::with_last_byte(1), &chain);
    let attacker = TestPeer::new(PeerId::with_last_byte(2), &[]).unresponsive();

    let index = ChainIndex::new(fetcher.dag.genesis().chain_index().asset_id, 1);
    let bogus: Vec<_> = (1..=4 * hash_limit as u64).map(bogus_hash).collect();
    for hash in &bogus {
        attacker.announce_hash(&fetcher.handle, *hash, index, Instant::now()).unwrap();
    }
    for unit in &chain {
        honest.announce(&fetcher.handle, unit).unwrap();
    }

    let events = collect_imports(&mut fetcher.events, chain.len(), WAIT).await;
    assert_eq!(imported(&events), chain.iter().map(Unit::hash).collect::<Vec<_>>());

    let attacker_announces = events
        .iter()
        .filter(|event| matches!(event, FetcherEvent::Announced(hash) if bogus.contains(hash)))
        .count();
    assert_eq!(attacker_announces, hash_limit);
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn block_memory_exhaustion() {
    let block_limit = 8;
    let mut fetcher = spawn_fetcher(test_config().with_block_limit(block_limit));
    let chain = generate_chain(&fetcher.dag.genesis(), 2 * block_limit + 1);
    let peer = PeerId::with_last_byte(1);

    // everything above the first unit waits for it, the furthest units are evicted
    for unit in &chain[1..] {
        fetcher.handle.enqueue(peer, unit.clone()).unwrap();
    }
    fetcher.handle.enqueue(peer, chain[0].clone()).unwrap();

    let events = collect_imports(&mut fetcher.events, block_limit, WAIT).await;
    let expected: Vec<_> = chain[..block_limit].iter().map(Unit::hash).collect();
    assert_eq!(imported(&events), expected);

    let late = collect_for(&mut fetcher.events, Duration::from_millis(200)).await;
    assert!(imported(&late).is_empty());
    assert_eq!(fetcher.dag.imported(), expected);
    fetcher.service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn distance_bound() {
    let config = test_config();
    let mut fetcher = spawn_fetcher(config);
    let chain = generate_chain(&fetcher.dag.genesis(), config.max_queue_dist as usize + 2);
    let far = chain.last().unwrap();
    let peer = TestPeer::new(PeerId::with_last_byte(1), &chain);

    peer.announce(&fetcher.handle, far).unwrap();
    fetcher.handle.enqueue(peer.peer_id(), far.clone()).unwrap();

    let events = collect_for(&mut fetcher.events, Duration::from_millis(200)).await;
    assert!(events.is_empty(), "unexpected events {events:?}");
    assert_eq!(peer.header_requests(), 0);
    fetcher.service.stop().await;
}
