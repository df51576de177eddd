//! Test helpers for the unit fetcher: an in-memory Dag, chain generation and scripted peers.

#![allow(missing_docs, unreachable_pub)]

use crate::{
    BodyRequester, DagClient, FetcherError, FetcherHandle, FetcherObserver, HeaderRequester,
    InsertUnitsError, NetworkClient, UnitError,
};
use parking_lot::Mutex;
use ptn_primitives::{
    proofs::calculate_tx_root, Address, AssetId, Bytes, ChainIndex, Header, PeerId, SealedHeader,
    Transaction, Unit, UnitHash, EMPTY_TX_ROOT,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc, time::Instant};

/// The first unit of an asset lane.
pub fn genesis(asset: AssetId) -> Unit {
    Unit::seal_slow(
        Header { number: ChainIndex::new(asset, 0), tx_root: EMPTY_TX_ROOT, ..Default::default() },
        vec![],
    )
}

/// Generates `n` units on top of `parent`. Every third unit, starting with the first, carries a
/// transaction, the others are empty.
pub fn generate_chain(parent: &Unit, n: usize) -> Vec<Unit> {
    let mut parent = parent.clone();
    let mut chain = Vec::with_capacity(n);
    for i in 0..n {
        let number = parent.chain_index().next();
        let transactions = if i % 3 == 0 {
            vec![Transaction::new(1, Bytes::copy_from_slice(&number.index.to_be_bytes()))]
        } else {
            vec![]
        };
        let header = Header {
            parents_hash: vec![parent.hash()],
            author: Address::with_last_byte(number.asset_id[15]),
            tx_root: calculate_tx_root(&transactions),
            number,
            time: number.index,
            ..Default::default()
        };
        let unit = Unit::seal_slow(header, transactions);
        chain.push(unit.clone());
        parent = unit;
    }
    chain
}

#[derive(Debug, Default)]
struct DagInner {
    units: HashMap<UnitHash, Unit>,
    heads: HashMap<AssetId, u64>,
    invalid: HashSet<UnitHash>,
    imported: Vec<UnitHash>,
    dropped: Vec<PeerId>,
    broadcasts: Vec<(UnitHash, bool)>,
}

/// An in-memory Dag that also records what the fetcher asks of the network.
#[derive(Debug)]
pub struct TestDag {
    genesis: Unit,
    inner: Mutex<DagInner>,
}

impl TestDag {
    pub fn new(genesis: Unit) -> Self {
        let dag = Self { genesis: genesis.clone(), inner: Default::default() };
        dag.add_genesis(genesis);
        dag
    }

    /// Adds the root of another asset lane.
    pub fn add_genesis(&self, genesis: Unit) {
        let mut inner = self.inner.lock();
        inner.heads.insert(genesis.chain_index().asset_id, genesis.number());
        inner.units.insert(genesis.hash(), genesis);
    }

    pub fn genesis(&self) -> Unit {
        self.genesis.clone()
    }

    /// Makes header verification fail for the unit.
    pub fn mark_invalid(&self, hash: UnitHash) {
        self.inner.lock().invalid.insert(hash);
    }

    pub fn contains(&self, hash: &UnitHash) -> bool {
        self.inner.lock().units.contains_key(hash)
    }

    /// Hashes of the inserted units, in insertion order.
    pub fn imported(&self) -> Vec<UnitHash> {
        self.inner.lock().imported.clone()
    }

    pub fn dropped_peers(&self) -> Vec<PeerId> {
        self.inner.lock().dropped.clone()
    }

    pub fn broadcasts(&self) -> Vec<(UnitHash, bool)> {
        self.inner.lock().broadcasts.clone()
    }
}

impl DagClient for TestDag {
    fn exists(&self, hash: &UnitHash) -> bool {
        self.contains(hash)
    }

    fn verify_header(&self, header: &SealedHeader) -> Result<(), UnitError> {
        if self.inner.lock().invalid.contains(&header.hash()) {
            return Err(UnitError::InvalidHeader {
                hash: header.hash(),
                reason: "marked invalid".to_string(),
            })
        }
        Ok(())
    }

    fn chain_height(&self, asset: AssetId) -> u64 {
        self.inner.lock().heads.get(&asset).copied().unwrap_or_default()
    }

    fn insert_units(&self, units: Vec<Unit>) -> Result<usize, InsertUnitsError> {
        let mut inner = self.inner.lock();
        let count = units.len();
        for (i, unit) in units.into_iter().enumerate() {
            if inner.units.contains_key(&unit.hash()) {
                continue
            }
            let known_parent =
                unit.parent_hash().is_some_and(|parent| inner.units.contains_key(&parent));
            if !known_parent {
                let error = UnitError::UnknownParent { hash: unit.hash(), number: unit.number() };
                return Err(InsertUnitsError::new(i, error))
            }
            let index = unit.chain_index();
            let head = inner.heads.entry(index.asset_id).or_default();
            *head = (*head).max(index.index);
            inner.imported.push(unit.hash());
            inner.units.insert(unit.hash(), unit);
        }
        Ok(count)
    }
}

impl NetworkClient for TestDag {
    fn broadcast_unit(&self, unit: &Unit, propagate: bool) {
        self.inner.lock().broadcasts.push((unit.hash(), propagate));
    }

    fn drop_peer(&self, peer_id: PeerId) {
        self.inner.lock().dropped.push(peer_id);
    }
}

/// A remote peer serving a fixed set of units.
///
/// Requests are answered from spawned tasks through the fetcher handle, like a network session
/// would.
#[derive(Debug, Clone)]
pub struct TestPeer {
    peer_id: PeerId,
    units: Arc<HashMap<UnitHash, Unit>>,
    header_requests: Arc<AtomicUsize>,
    body_requests: Arc<AtomicUsize>,
    responsive: bool,
}

impl TestPeer {
    pub fn new(peer_id: PeerId, units: &[Unit]) -> Self {
        Self {
            peer_id,
            units: Arc::new(units.iter().map(|unit| (unit.hash(), unit.clone())).collect()),
            header_requests: Default::default(),
            body_requests: Default::default(),
            responsive: true,
        }
    }

    /// Counts requests but never answers them.
    pub fn unresponsive(mut self) -> Self {
        self.responsive = false;
        self
    }

    pub const fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Number of requested headers.
    pub fn header_requests(&self) -> usize {
        self.header_requests.load(Ordering::SeqCst)
    }

    /// Number of requested bodies.
    pub fn body_requests(&self) -> usize {
        self.body_requests.load(Ordering::SeqCst)
    }

    pub fn header_requester(&self, handle: &FetcherHandle) -> HeaderRequester {
        let peer = self.clone();
        let handle = handle.clone();
        Arc::new(move |hash| {
            peer.header_requests.fetch_add(1, Ordering::SeqCst);
            let Some(unit) = peer.units.get(&hash).filter(|_| peer.responsive) else {
                return Ok(())
            };
            let (handle, peer_id, header) = (handle.clone(), peer.peer_id, unit.header.clone());
            tokio::spawn(async move {
                let _ = handle.filter_headers(peer_id, vec![header], Instant::now()).await;
            });
            Ok(())
        })
    }

    pub fn body_requester(&self, handle: &FetcherHandle) -> BodyRequester {
        let peer = self.clone();
        let handle = handle.clone();
        Arc::new(move |hashes| {
            peer.body_requests.fetch_add(hashes.len(), Ordering::SeqCst);
            if !peer.responsive {
                return Ok(())
            }
            let bodies: Vec<_> = hashes
                .iter()
                .filter_map(|hash| peer.units.get(hash))
                .map(|unit| unit.transactions.clone())
                .collect();
            let (handle, peer_id) = (handle.clone(), peer.peer_id);
            tokio::spawn(async move {
                let _ = handle.filter_bodies(peer_id, bodies, Instant::now()).await;
            });
            Ok(())
        })
    }

    /// Announces the unit as if it just arrived from this peer.
    pub fn announce(&self, handle: &FetcherHandle, unit: &Unit) -> Result<(), FetcherError> {
        self.announce_at(handle, unit, Instant::now())
    }

    /// Announces the unit as if it arrived at `time`.
    pub fn announce_at(
        &self,
        handle: &FetcherHandle,
        unit: &Unit,
        time: Instant,
    ) -> Result<(), FetcherError> {
        self.announce_hash(handle, unit.hash(), unit.chain_index(), time)
    }

    /// Announces an arbitrary hash.
    pub fn announce_hash(
        &self,
        handle: &FetcherHandle,
        hash: UnitHash,
        chain_index: ChainIndex,
        time: Instant,
    ) -> Result<(), FetcherError> {
        handle.notify(
            self.peer_id,
            hash,
            chain_index,
            time,
            self.header_requester(handle),
            self.body_requester(handle),
        )
    }
}

/// What the fetcher reported through [`FetcherObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetcherEvent {
    Fetching(Vec<UnitHash>),
    Completing(Vec<UnitHash>),
    Imported(UnitHash),
    Queued(UnitHash),
    Dequeued(UnitHash),
    Announced(UnitHash),
    Unannounced(UnitHash),
}

/// Forwards every observation to a channel.
#[derive(Debug)]
pub struct TestObserver {
    tx: mpsc::UnboundedSender<FetcherEvent>,
}

impl TestObserver {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FetcherEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn send(&self, event: FetcherEvent) {
        let _ = self.tx.send(event);
    }
}

impl FetcherObserver for TestObserver {
    fn on_fetching(&self, hashes: &[UnitHash]) {
        self.send(FetcherEvent::Fetching(hashes.to_vec()))
    }

    fn on_completing(&self, hashes: &[UnitHash]) {
        self.send(FetcherEvent::Completing(hashes.to_vec()))
    }

    fn on_imported(&self, unit: &Unit) {
        self.send(FetcherEvent::Imported(unit.hash()))
    }

    fn on_queue_change(&self, hash: UnitHash, added: bool) {
        self.send(if added { FetcherEvent::Queued(hash) } else { FetcherEvent::Dequeued(hash) })
    }

    fn on_announce_change(&self, hash: UnitHash, added: bool) {
        self.send(if added {
            FetcherEvent::Announced(hash)
        } else {
            FetcherEvent::Unannounced(hash)
        })
    }
}

/// Collects events until `n` units were imported or `timeout` elapsed, returns every event seen.
pub async fn collect_imports(
    events: &mut mpsc::UnboundedReceiver<FetcherEvent>,
    n: usize,
    timeout: Duration,
) -> Vec<FetcherEvent> {
    let mut seen = Vec::new();
    let mut imported = 0;
    let deadline = Instant::now() + timeout;
    while imported < n {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(event)) => {
                imported += matches!(event, FetcherEvent::Imported(_)) as usize;
                seen.push(event);
            }
            Ok(None) | Err(_) => break,
        }
    }
    seen
}

/// Collects every event that arrives within `window`.
pub async fn collect_for(
    events: &mut mpsc::UnboundedReceiver<FetcherEvent>,
    window: Duration,
) -> Vec<FetcherEvent> {
    let mut seen = Vec::new();
    let deadline = Instant::now() + window;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        seen.push(event);
    }
    seen
}

/// Hashes of the imported units, in import order.
pub fn imported(events: &[FetcherEvent]) -> Vec<UnitHash> {
    events
        .iter()
        .filter_map(|event| match event {
            FetcherEvent::Imported(hash) => Some(*hash),
            _ => None,
        })
        .collect()
}
