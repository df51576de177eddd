use crate::{
    client::{BodyRequester, DagClient, HeaderRequester, NetworkClient},
    config::FetcherConfig,
    error::InsertUnitsError,
    handle::{FetcherHandle, FetcherMessage},
    hooks::{FetcherObserver, Hooks},
    metrics::FetcherMetrics,
    queue::{ImportQueue, QueuedUnit},
    state::{Announced, Completing, FetchState, Origin},
    timer::TimerKey,
};
use ptn_primitives::{
    proofs::calculate_tx_root, ChainIndex, PeerId, SealedHeader, Transaction, Unit, UnitHash,
    WithPeerId,
};
use ptn_tasks::{
    shutdown::{self, Shutdown, Signal},
    TaskSpawner, TokioTaskExecutor,
};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, error, trace, warn};

/// Upper bound for any deadline the fetcher schedules.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Turns unit announcements and pushed units into imported units.
///
/// The fetcher owns all of its state and runs as a single task, see [`UnitFetcher::start`].
/// Peers feed it through the [`FetcherHandle`] returned by [`UnitFetcher::new`]:
///
/// 1. An announced hash waits a short gather window so duplicate announcements from other peers
///    merge into one.
/// 2. Its header is requested from one announcing peer and verified on arrival.
/// 3. Units without transactions are complete at this point, the others get their body
///    requested from the same peer.
/// 4. Assembled units wait in the import queue until they connect to the local head of their
///    asset lane, and are then inserted in ascending height order.
///
/// Every stage is bounded: per peer by `hash_limit`, in height by `max_queue_dist` and in queued
/// units by `block_limit`. Requests that are not answered within `arrive_timeout` are forgotten.
#[must_use = "the fetcher does nothing unless started"]
pub struct UnitFetcher<D, N> {
    config: FetcherConfig,
    /// Local Dag.
    dag: D,
    /// Peer to peer layer.
    network: N,
    /// Announcements and outstanding requests.
    state: FetchState,
    /// Assembled units waiting for their parents.
    queue: ImportQueue,
    hooks: Hooks,
    from_handles: mpsc::Receiver<FetcherMessage>,
    metrics: FetcherMetrics,
}

impl<D, N> UnitFetcher<D, N>
where
    D: DagClient + 'static,
    N: NetworkClient + 'static,
{
    /// Creates the fetcher and the handle to feed it.
    pub fn new(config: FetcherConfig, dag: D, network: N) -> (Self, FetcherHandle) {
        let (to_fetcher, from_handles) = mpsc::channel(config.message_buffer.max(1));
        let fetcher = Self {
            config,
            dag,
            network,
            state: FetchState::default(),
            queue: ImportQueue::default(),
            hooks: Hooks::default(),
            from_handles,
            metrics: FetcherMetrics::default(),
        };
        (fetcher, FetcherHandle::new(to_fetcher))
    }

    /// Installs an observer that is told about every state change.
    pub fn with_observer(mut self, observer: Arc<dyn FetcherObserver>) -> Self {
        self.hooks = Hooks::new(observer);
        self
    }

    /// Spawns the fetcher loop on the current tokio runtime.
    pub fn start(self) -> FetcherService {
        self.start_with(&TokioTaskExecutor::default())
    }

    /// Spawns the fetcher loop with the given spawner.
    pub fn start_with(self, spawner: &dyn TaskSpawner) -> FetcherService {
        let (signal, shutdown) = shutdown::signal();
        let task = spawner.spawn_critical_task("unit fetcher", Box::pin(self.run(shutdown)));
        FetcherService { signal, task }
    }

    async fn run(mut self, mut shutdown: Shutdown) {
        debug!(target: "net::fetcher", "unit fetcher started");
        loop {
            let deadline = self.state.next_deadline();
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = sleep_until(deadline) => self.on_timer(Instant::now()),
                msg = self.from_handles.recv() => match msg {
                    Some(msg) => self.on_message(msg),
                    None => break,
                },
            }
            self.drain_queue();
            self.metrics.pending_announces.set(self.state.announced_len() as f64);
            self.metrics.queued_units.set(self.queue.len() as f64);
        }
        debug!(target: "net::fetcher", "unit fetcher stopped");
    }

    fn on_message(&mut self, msg: FetcherMessage) {
        match msg {
            FetcherMessage::Notify {
                peer_id,
                hash,
                chain_index,
                time,
                header_requester,
                body_requester,
            } => self.on_notify(peer_id, hash, chain_index, time, header_requester, body_requester),
            FetcherMessage::Enqueue { peer_id, unit } => self.on_enqueue(peer_id, unit),
            FetcherMessage::FilterHeaders { peer_id, headers, time, tx } => {
                let unmatched = self.on_headers(peer_id, headers, time);
                let _ = tx.send(unmatched);
            }
            FetcherMessage::FilterBodies { peer_id, bodies, time, tx } => {
                let unmatched = self.on_bodies(peer_id, bodies, time);
                let _ = tx.send(unmatched);
            }
            FetcherMessage::RemovePeer(peer_id) => self.on_remove_peer(peer_id),
        }
    }

    /// Admits an announcement.
    fn on_notify(
        &mut self,
        peer_id: PeerId,
        hash: UnitHash,
        chain_index: ChainIndex,
        time: Instant,
        header_requester: HeaderRequester,
        body_requester: BodyRequester,
    ) {
        self.metrics.announces_in.increment(1);

        if self.dag.exists(&hash) {
            trace!(target: "net::fetcher", %peer_id, %hash, "announced unit already stored");
            self.metrics.announces_dropped.increment(1);
            return
        }
        let head = self.dag.chain_height(chain_index.asset_id);
        let distance = chain_index.distance(head);
        if distance > self.config.max_queue_dist {
            trace!(target: "net::fetcher", %peer_id, %hash, %chain_index, head, distance, "discarded announcement too far from head");
            self.metrics.announces_dropped.increment(1);
            return
        }
        if self.state.charged(&peer_id) >= self.config.hash_limit {
            debug!(target: "net::fetcher", %peer_id, %hash, limit = self.config.hash_limit, "peer exceeded outstanding announces");
            self.metrics.announces_dos.increment(1);
            return
        }
        if self.state.is_active(&hash) || self.queue.contains(&hash) {
            trace!(target: "net::fetcher", %peer_id, %hash, "announced unit already in flight");
            return
        }

        let origin = Origin { peer_id, header_requester, body_requester };
        let due = deadline_after(time, self.config.gather_slack);
        match self.state.announce(hash, chain_index, origin, due) {
            Announced::New => {
                trace!(target: "net::fetcher", %peer_id, %hash, %chain_index, "scheduling announced unit");
                self.hooks.announce_change(hash, true);
            }
            Announced::Merged => {
                trace!(target: "net::fetcher", %peer_id, %hash, "merged announcement");
            }
            Announced::Duplicate => {}
        }
    }

    /// Dispatches due announcements and expires overdue requests.
    fn on_timer(&mut self, now: Instant) {
        let mut batches: HashMap<PeerId, Vec<(UnitHash, ChainIndex, Origin)>> = HashMap::new();

        for key in self.state.pop_expired(now) {
            match key {
                TimerKey::Announce(hash) => {
                    let Some(announcement) = self.state.take_announcement(&hash) else { continue };

                    if self.dag.exists(&hash) || self.queue.contains(&hash) {
                        for origin in &announcement.origins {
                            self.state.release(&origin.peer_id);
                        }
                        self.hooks.announce_change(hash, false);
                        continue
                    }

                    // peers are busy if a header batch was outstanding before this round
                    let idle =
                        announcement.origins.iter().position(|o| !self.state.is_busy(&o.peer_id));
                    let Some(idle) = idle else {
                        trace!(target: "net::fetcher", %hash, "all announcing peers busy");
                        self.state.defer_announcement(
                            hash,
                            announcement,
                            deadline_after(now, self.config.gather_slack),
                        );
                        continue
                    };

                    let mut origins = announcement.origins;
                    let origin = origins.swap_remove(idle);
                    for other in &origins {
                        self.state.release(&other.peer_id);
                    }
                    self.hooks.announce_change(hash, false);
                    batches.entry(origin.peer_id).or_default().push((
                        hash,
                        announcement.chain_index,
                        origin,
                    ));
                }
                TimerKey::Header(hash) => {
                    if let Some(peer_id) = self.state.expire_fetching(&hash) {
                        debug!(target: "net::fetcher", %peer_id, %hash, "header request timed out");
                        self.metrics.timeouts.increment(1);
                    }
                }
                TimerKey::Body(hash) => {
                    if let Some(peer_id) = self.state.expire_completing(&hash) {
                        debug!(target: "net::fetcher", %peer_id, %hash, "body request timed out");
                        self.metrics.timeouts.increment(1);
                    }
                }
            }
        }

        let deadline = deadline_after(now, self.config.arrive_timeout);
        for (peer_id, batch) in batches {
            let hashes: Vec<_> = batch.iter().map(|(hash, _, _)| *hash).collect();
            trace!(target: "net::fetcher", %peer_id, count = hashes.len(), "fetching headers");
            self.hooks.fetching(&hashes);

            for (hash, chain_index, origin) in &batch {
                self.state.start_fetching(*hash, origin, *chain_index, deadline);
            }
            for (hash, _, origin) in batch {
                self.metrics.header_fetches.increment(1);
                if let Err(err) = (origin.header_requester)(hash) {
                    debug!(target: "net::fetcher", %peer_id, %hash, %err, "header request failed");
                    self.forget(&hash);
                }
            }
        }
    }

    /// Consumes the requested headers of `peer_id`, returns the rest.
    fn on_headers(
        &mut self,
        peer_id: PeerId,
        headers: Vec<SealedHeader>,
        time: Instant,
    ) -> Vec<SealedHeader> {
        self.metrics.filter_headers_in.increment(headers.len() as u64);

        let mut unmatched = Vec::new();
        let mut complete = Vec::new();
        let mut body_requester = None;

        for header in headers {
            let hash = header.hash();
            let Some(fetching) = self.state.take_fetching(&peer_id, &hash) else {
                unmatched.push(header);
                continue
            };

            if header.number != fetching.chain_index {
                warn!(target: "net::fetcher", %peer_id, %hash, announced = %fetching.chain_index, delivered = %header.number, "header chain index differs from announcement");
                self.state.release(&peer_id);
                self.drop_peer(peer_id);
                continue
            }
            if self.dag.exists(&hash) {
                trace!(target: "net::fetcher", %peer_id, %hash, "fetched unit already stored");
                self.state.release(&peer_id);
                continue
            }
            if let Err(err) = self.dag.verify_header(&header) {
                warn!(target: "net::fetcher", %peer_id, %hash, %err, "received invalid header");
                self.state.release(&peer_id);
                self.drop_peer(peer_id);
                continue
            }

            if header.is_empty() {
                trace!(target: "net::fetcher", %peer_id, %hash, "unit has no transactions");
                self.state.release(&peer_id);
                self.schedule_import(peer_id, Unit::with_header(header));
                continue
            }

            self.state.start_completing(
                Completing { peer_id, header, received_at: time },
                deadline_after(time, self.config.arrive_timeout),
            );
            complete.push(hash);
            body_requester = Some(fetching.body_requester);
        }

        if let Some(request) = body_requester {
            trace!(target: "net::fetcher", %peer_id, count = complete.len(), "fetching bodies");
            self.hooks.completing(&complete);
            self.metrics.body_fetches.increment(complete.len() as u64);
            if let Err(err) = request(complete.clone()) {
                debug!(target: "net::fetcher", %peer_id, %err, "body request failed");
                for hash in &complete {
                    self.forget(hash);
                }
            }
        }

        self.metrics.filter_headers_out.increment(unmatched.len() as u64);
        unmatched
    }

    /// Consumes the requested bodies of `peer_id`, returns the rest.
    fn on_bodies(
        &mut self,
        peer_id: PeerId,
        bodies: Vec<Vec<Transaction>>,
        time: Instant,
    ) -> Vec<Vec<Transaction>> {
        self.metrics.filter_bodies_in.increment(bodies.len() as u64);

        let mut unmatched = Vec::new();
        for transactions in bodies {
            let tx_root = calculate_tx_root(&transactions);
            let Some(completing) = self.state.take_completing(&peer_id, &tx_root) else {
                unmatched.push(transactions);
                continue
            };
            self.state.release(&peer_id);

            let elapsed = time.saturating_duration_since(completing.received_at);
            let unit = Unit::new(completing.header, transactions);
            if self.dag.exists(&unit.hash()) {
                continue
            }
            trace!(target: "net::fetcher", %peer_id, hash = %unit.hash(), ?elapsed, "assembled unit");
            self.schedule_import(peer_id, unit);
        }

        self.metrics.filter_bodies_out.increment(unmatched.len() as u64);
        unmatched
    }

    /// Admits a unit pushed by `peer_id`.
    fn on_enqueue(&mut self, peer_id: PeerId, unit: Unit) {
        self.metrics.broadcasts_in.increment(1);

        let hash = unit.hash();
        if self.dag.exists(&hash) ||
            self.queue.contains(&hash) ||
            self.state.is_active(&hash) ||
            self.state.is_announced(&hash)
        {
            trace!(target: "net::fetcher", %peer_id, %hash, "pushed unit already known");
            return
        }

        let chain_index = unit.chain_index();
        let head = self.dag.chain_height(chain_index.asset_id);
        let distance = chain_index.distance(head);
        if distance > self.config.max_queue_dist {
            debug!(target: "net::fetcher", %peer_id, %hash, %chain_index, head, distance, "discarded pushed unit too far from head");
            self.metrics.broadcasts_dropped.increment(1);
            return
        }
        if let Err(err) = self.dag.verify_header(&unit.header) {
            warn!(target: "net::fetcher", %peer_id, %hash, %err, "pushed unit has invalid header");
            self.metrics.broadcasts_dropped.increment(1);
            self.drop_peer(peer_id);
            return
        }
        if !unit.ensure_tx_root() {
            warn!(target: "net::fetcher", %peer_id, %hash, "pushed unit body does not match header");
            self.metrics.broadcasts_dropped.increment(1);
            self.drop_peer(peer_id);
            return
        }

        if !self.schedule_import(peer_id, unit) {
            self.metrics.broadcasts_dos.increment(1);
        }
    }

    fn on_remove_peer(&mut self, peer_id: PeerId) {
        let removed = self.state.remove_peer(&peer_id);
        debug!(target: "net::fetcher", %peer_id, announcements = removed.len(), "removed peer");
        for hash in removed {
            self.hooks.announce_change(hash, false);
        }
    }

    /// Queues an assembled unit and evicts the furthest units while the queue is over its limit.
    ///
    /// Returns false if the unit itself was evicted.
    fn schedule_import(&mut self, peer_id: PeerId, unit: Unit) -> bool {
        let hash = unit.hash();
        if !self.queue.insert(peer_id, unit) {
            return true
        }
        trace!(target: "net::fetcher", %peer_id, %hash, queued = self.queue.len(), "queued unit");
        self.hooks.queue_change(hash, true);

        let mut kept = true;
        while self.queue.len() > self.config.block_limit {
            let dag = &self.dag;
            let Some(evicted) = self.queue.evict_furthest(|asset| dag.chain_height(asset)) else {
                break
            };
            let evicted_hash = evicted.data().hash();
            debug!(target: "net::fetcher", peer_id = %evicted.peer_id(), hash = %evicted_hash, number = evicted.data().number(), "import queue full, evicted unit");
            self.hooks.queue_change(evicted_hash, false);
            kept &= evicted_hash != hash;
        }
        kept
    }

    /// Imports every queued run that connects to the head of its lane.
    fn drain_queue(&mut self) {
        for asset in self.queue.assets() {
            loop {
                let head = self.dag.chain_height(asset);
                let mut next = head.saturating_add(1);
                let mut stale = Vec::new();
                let mut run = Vec::new();
                for queued in self.queue.lane(&asset) {
                    let unit = queued.data();
                    if self.dag.exists(&unit.hash()) {
                        stale.push(unit.hash());
                        continue
                    }
                    if unit.number() > next {
                        break
                    }
                    next = next.max(unit.number().saturating_add(1));
                    run.push(unit.hash());
                }

                for hash in stale {
                    if self.queue.remove(&hash).is_some() {
                        self.hooks.queue_change(hash, false);
                    }
                }
                if run.is_empty() {
                    break
                }
                // every pass removes at least one unit from the lane
                let run: Vec<_> = run.iter().filter_map(|hash| self.queue.remove(hash)).collect();
                self.import(run);
            }
        }
    }

    /// Inserts the run in one batch.
    ///
    /// A rejected unit is discarded, the units after it go back to the queue.
    fn import(&mut self, run: Vec<QueuedUnit>) {
        let (peers, units): (Vec<PeerId>, Vec<Unit>) =
            run.into_iter().map(WithPeerId::split).unzip();
        debug!(target: "net::fetcher", count = units.len(), first = ?units.first().map(|u| u.chain_index()), "importing units");

        match self.dag.insert_units(units.clone()) {
            Ok(inserted) => {
                for (i, unit) in units.iter().enumerate() {
                    self.hooks.queue_change(unit.hash(), false);
                    if i < inserted {
                        self.on_imported(unit);
                    } else {
                        debug!(target: "net::fetcher", hash = %unit.hash(), "unit not inserted, discarding");
                    }
                }
            }
            Err(InsertUnitsError { inserted, error }) => {
                let inserted = inserted.min(units.len());
                for unit in &units[..inserted] {
                    self.hooks.queue_change(unit.hash(), false);
                    self.on_imported(unit);
                }
                let mut rest = peers.into_iter().zip(units).skip(inserted);
                if let Some((peer_id, unit)) = rest.next() {
                    warn!(target: "net::fetcher", %peer_id, hash = %unit.hash(), %error, "unit import failed");
                    self.hooks.queue_change(unit.hash(), false);
                    self.drop_peer(peer_id);
                }
                for (peer_id, unit) in rest {
                    self.queue.insert(peer_id, unit);
                }
            }
        }
    }

    fn on_imported(&mut self, unit: &Unit) {
        trace!(target: "net::fetcher", hash = %unit.hash(), chain_index = %unit.chain_index(), "imported unit");
        self.metrics.imported_units.increment(1);
        self.hooks.imported(unit);
        self.network.broadcast_unit(unit, true);
    }

    /// Forgets a hash after a failed request.
    fn forget(&mut self, hash: &UnitHash) {
        if self.state.purge(hash) {
            self.hooks.announce_change(*hash, false);
        }
    }

    fn drop_peer(&self, peer_id: PeerId) {
        self.metrics.dropped_peers.increment(1);
        self.network.drop_peer(peer_id);
    }
}

impl<D, N> fmt::Debug for UnitFetcher<D, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitFetcher")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("queue", &self.queue)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Sleeps until the deadline, or forever if there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// `start + delay`, capped far in the future instead of overflowing.
fn deadline_after(start: Instant, delay: Duration) -> Instant {
    start
        .checked_add(delay)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// A running [`UnitFetcher`].
///
/// Dropping the service also stops the fetcher, but without waiting for it.
#[derive(Debug)]
pub struct FetcherService {
    signal: Signal,
    task: JoinHandle<()>,
}

impl FetcherService {
    /// Stops the fetcher loop and waits until it exited.
    ///
    /// Pending announcements and queued units are discarded. Handles fail with
    /// [`FetcherError::Terminated`](crate::FetcherError::Terminated) afterwards.
    pub async fn stop(self) {
        self.signal.fire();
        if let Err(err) = self.task.await {
            error!(target: "net::fetcher", %err, "unit fetcher task failed");
        }
    }
}
