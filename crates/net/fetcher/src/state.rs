//! Per hash retrieval state and per peer accounting.

use crate::{
    client::{BodyRequester, HeaderRequester},
    timer::{Deadlines, TimerKey},
};
use ptn_primitives::{ChainIndex, PeerId, SealedHeader, UnitHash, B256};
use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    fmt,
};
use tokio::time::Instant;

/// A peer that announced a hash, with the means to fetch it from that peer.
#[derive(Clone)]
pub(crate) struct Origin {
    pub(crate) peer_id: PeerId,
    pub(crate) header_requester: HeaderRequester,
    pub(crate) body_requester: BodyRequester,
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin").field("peer_id", &self.peer_id).finish_non_exhaustive()
    }
}

/// A hash announced by one or more peers, waiting for dispatch.
#[derive(Debug)]
pub(crate) struct Announcement {
    pub(crate) chain_index: ChainIndex,
    pub(crate) origins: Vec<Origin>,
    pub(crate) due: Instant,
}

/// A header request in flight.
pub(crate) struct Fetching {
    pub(crate) peer_id: PeerId,
    pub(crate) chain_index: ChainIndex,
    pub(crate) body_requester: BodyRequester,
}

impl fmt::Debug for Fetching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetching")
            .field("peer_id", &self.peer_id)
            .field("chain_index", &self.chain_index)
            .finish_non_exhaustive()
    }
}

/// A verified header whose body request is in flight.
#[derive(Debug)]
pub(crate) struct Completing {
    pub(crate) peer_id: PeerId,
    pub(crate) header: SealedHeader,
    pub(crate) received_at: Instant,
}

/// How an announcement was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Announced {
    /// First announcement of the hash.
    New,
    /// Another peer announced the hash too.
    Merged,
    /// The peer already announced this hash.
    Duplicate,
}

/// Everything the fetcher tracks about hashes that are not yet assembled into units.
///
/// A hash is in at most one of the announced, fetching and completing stages. Each peer is
/// charged one unit of its announcement budget for every hash it originates in any stage.
#[derive(Debug, Default)]
pub(crate) struct FetchState {
    announced: HashMap<UnitHash, Announcement>,
    fetching: HashMap<UnitHash, Fetching>,
    completing: HashMap<UnitHash, Completing>,
    /// Hashes whose header request is outstanding, per peer.
    inflight: HashMap<PeerId, HashSet<UnitHash>>,
    /// Unresolved hashes charged to each peer.
    charged: HashMap<PeerId, usize>,
    deadlines: Deadlines,
}

impl FetchState {
    /// Number of unresolved hashes charged to the peer.
    pub(crate) fn charged(&self, peer_id: &PeerId) -> usize {
        self.charged.get(peer_id).copied().unwrap_or_default()
    }

    /// Returns true if the peer has an outstanding header batch.
    pub(crate) fn is_busy(&self, peer_id: &PeerId) -> bool {
        self.inflight.get(peer_id).is_some_and(|hashes| !hashes.is_empty())
    }

    /// Returns true if the hash is being fetched or completed.
    pub(crate) fn is_active(&self, hash: &UnitHash) -> bool {
        self.fetching.contains_key(hash) || self.completing.contains_key(hash)
    }

    pub(crate) fn is_announced(&self, hash: &UnitHash) -> bool {
        self.announced.contains_key(hash)
    }

    pub(crate) fn announced_len(&self) -> usize {
        self.announced.len()
    }

    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        self.deadlines.next_deadline()
    }

    pub(crate) fn pop_expired(&mut self, now: Instant) -> Vec<TimerKey> {
        self.deadlines.pop_expired(now)
    }

    /// Records an announcement of `hash` by `origin`, due at `due` unless an earlier
    /// announcement is already due sooner.
    pub(crate) fn announce(
        &mut self,
        hash: UnitHash,
        chain_index: ChainIndex,
        origin: Origin,
        due: Instant,
    ) -> Announced {
        let peer_id = origin.peer_id;
        let outcome = match self.announced.entry(hash) {
            Entry::Occupied(mut entry) => {
                let announcement = entry.get_mut();
                if due < announcement.due {
                    announcement.due = due;
                }
                if announcement.origins.iter().any(|o| o.peer_id == peer_id) {
                    Announced::Duplicate
                } else {
                    announcement.origins.push(origin);
                    Announced::Merged
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Announcement { chain_index, origins: vec![origin], due });
                Announced::New
            }
        };
        if outcome != Announced::Duplicate {
            *self.charged.entry(peer_id).or_default() += 1;
        }
        if let Some(announcement) = self.announced.get(&hash) {
            self.deadlines.schedule(TimerKey::Announce(hash), announcement.due);
        }
        outcome
    }

    /// Takes the announcement out for dispatch. Its origins stay charged.
    pub(crate) fn take_announcement(&mut self, hash: &UnitHash) -> Option<Announcement> {
        self.deadlines.cancel(&TimerKey::Announce(*hash));
        self.announced.remove(hash)
    }

    /// Puts an undispatched announcement back, due at `due`.
    pub(crate) fn defer_announcement(
        &mut self,
        hash: UnitHash,
        mut announcement: Announcement,
        due: Instant,
    ) {
        announcement.due = due;
        self.deadlines.schedule(TimerKey::Announce(hash), due);
        self.announced.insert(hash, announcement);
    }

    /// Moves a dispatched hash to the fetching stage, expiring at `deadline`.
    pub(crate) fn start_fetching(
        &mut self,
        hash: UnitHash,
        origin: &Origin,
        chain_index: ChainIndex,
        deadline: Instant,
    ) {
        self.inflight.entry(origin.peer_id).or_default().insert(hash);
        self.fetching.insert(
            hash,
            Fetching {
                peer_id: origin.peer_id,
                chain_index,
                body_requester: origin.body_requester.clone(),
            },
        );
        self.deadlines.schedule(TimerKey::Header(hash), deadline);
    }

    /// Takes the fetching entry of `hash` if it was requested from `peer_id`.
    ///
    /// The peer stays charged for the hash until [`FetchState::release`] is called.
    pub(crate) fn take_fetching(
        &mut self,
        peer_id: &PeerId,
        hash: &UnitHash,
    ) -> Option<Fetching> {
        if self.fetching.get(hash)?.peer_id != *peer_id {
            return None
        }
        self.deadlines.cancel(&TimerKey::Header(*hash));
        self.remove_inflight(peer_id, hash);
        self.fetching.remove(hash)
    }

    /// Moves a received header to the completing stage, expiring at `deadline`.
    pub(crate) fn start_completing(&mut self, completing: Completing, deadline: Instant) {
        let hash = completing.header.hash();
        self.completing.insert(hash, completing);
        self.deadlines.schedule(TimerKey::Body(hash), deadline);
    }

    /// Takes a completing entry of `peer_id` whose header commits to `tx_root`.
    ///
    /// The peer stays charged for the hash until [`FetchState::release`] is called.
    pub(crate) fn take_completing(
        &mut self,
        peer_id: &PeerId,
        tx_root: &B256,
    ) -> Option<Completing> {
        let hash = self
            .completing
            .iter()
            .filter(|(_, c)| c.peer_id == *peer_id && c.header.tx_root == *tx_root)
            .min_by_key(|(_, c)| c.received_at)
            .map(|(hash, _)| *hash)?;
        self.deadlines.cancel(&TimerKey::Body(hash));
        self.completing.remove(&hash)
    }

    /// Gives one unit of announcement budget back to the peer.
    pub(crate) fn release(&mut self, peer_id: &PeerId) {
        if let Entry::Occupied(mut entry) = self.charged.entry(*peer_id) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
    }

    /// Drops every trace of the hash and releases the peers charged for it.
    ///
    /// Returns true if an undispatched announcement was removed.
    pub(crate) fn purge(&mut self, hash: &UnitHash) -> bool {
        let mut announced = false;
        if let Some(announcement) = self.take_announcement(hash) {
            for origin in &announcement.origins {
                self.release(&origin.peer_id);
            }
            announced = true;
        }
        if let Some(fetching) = self.fetching.remove(hash) {
            self.deadlines.cancel(&TimerKey::Header(*hash));
            self.remove_inflight(&fetching.peer_id, hash);
            self.release(&fetching.peer_id);
        }
        if let Some(completing) = self.completing.remove(hash) {
            self.deadlines.cancel(&TimerKey::Body(*hash));
            self.release(&completing.peer_id);
        }
        announced
    }

    /// Expires the header request of `hash`, returns the peer it was sent to.
    pub(crate) fn expire_fetching(&mut self, hash: &UnitHash) -> Option<PeerId> {
        let fetching = self.fetching.remove(hash)?;
        self.remove_inflight(&fetching.peer_id, hash);
        self.release(&fetching.peer_id);
        Some(fetching.peer_id)
    }

    /// Expires the body request of `hash`, returns the peer it was sent to.
    pub(crate) fn expire_completing(&mut self, hash: &UnitHash) -> Option<PeerId> {
        let completing = self.completing.remove(hash)?;
        self.release(&completing.peer_id);
        Some(completing.peer_id)
    }

    /// Forgets everything attributed to the peer.
    ///
    /// Announcements that other peers made as well keep those origins. Returns the hashes whose
    /// announcement was removed.
    pub(crate) fn remove_peer(&mut self, peer_id: &PeerId) -> Vec<UnitHash> {
        let mut removed = Vec::new();
        self.announced.retain(|hash, announcement| {
            announcement.origins.retain(|o| o.peer_id != *peer_id);
            let keep = !announcement.origins.is_empty();
            if !keep {
                removed.push(*hash);
            }
            keep
        });
        for hash in &removed {
            self.deadlines.cancel(&TimerKey::Announce(*hash));
        }

        let fetching: Vec<_> = self
            .fetching
            .iter()
            .filter(|(_, f)| f.peer_id == *peer_id)
            .map(|(h, _)| *h)
            .collect();
        for hash in fetching {
            self.fetching.remove(&hash);
            self.deadlines.cancel(&TimerKey::Header(hash));
        }
        let completing: Vec<_> = self
            .completing
            .iter()
            .filter(|(_, c)| c.peer_id == *peer_id)
            .map(|(h, _)| *h)
            .collect();
        for hash in completing {
            self.completing.remove(&hash);
            self.deadlines.cancel(&TimerKey::Body(hash));
        }

        self.inflight.remove(peer_id);
        self.charged.remove(peer_id);
        removed
    }

    fn remove_inflight(&mut self, peer_id: &PeerId, hash: &UnitHash) {
        if let Entry::Occupied(mut entry) = self.inflight.entry(*peer_id) {
            entry.get_mut().remove(hash);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptn_primitives::{AssetId, Header};
    use std::{sync::Arc, time::Duration};

    fn origin(peer: u8) -> Origin {
        Origin {
            peer_id: PeerId::with_last_byte(peer),
            header_requester: Arc::new(|_| Ok(())),
            body_requester: Arc::new(|_| Ok(())),
        }
    }

    fn index(height: u64) -> ChainIndex {
        ChainIndex::new(AssetId::with_last_byte(1), height)
    }

    #[test]
    fn merged_announcements_keep_earliest_due() {
        let now = Instant::now();
        let mut state = FetchState::default();
        let hash = UnitHash::with_last_byte(1);

        let late = now + Duration::from_millis(50);
        assert_eq!(state.announce(hash, index(1), origin(1), late), Announced::New);
        assert_eq!(state.announce(hash, index(1), origin(1), now), Announced::Duplicate);
        assert_eq!(state.announce(hash, index(1), origin(2), now), Announced::Merged);

        assert_eq!(state.charged(&PeerId::with_last_byte(1)), 1);
        assert_eq!(state.charged(&PeerId::with_last_byte(2)), 1);
        assert_eq!(state.next_deadline(), Some(now));

        assert!(state.purge(&hash));
        assert_eq!(state.charged(&PeerId::with_last_byte(1)), 0);
        assert_eq!(state.charged(&PeerId::with_last_byte(2)), 0);
        assert_eq!(state.next_deadline(), None);
    }

    #[test]
    fn reannouncement_lowers_due() {
        let now = Instant::now();
        let mut state = FetchState::default();
        let hash = UnitHash::with_last_byte(1);
        let peer = PeerId::with_last_byte(1);

        let late = now + Duration::from_millis(50);
        assert_eq!(state.announce(hash, index(1), origin(1), late), Announced::New);
        assert_eq!(state.announce(hash, index(1), origin(1), now), Announced::Duplicate);
        assert_eq!(state.charged(&peer), 1);
        assert_eq!(state.next_deadline(), Some(now));

        // a later duplicate does not push the deadline back
        assert_eq!(state.announce(hash, index(1), origin(1), late), Announced::Duplicate);
        assert_eq!(state.next_deadline(), Some(now));
        assert_eq!(state.pop_expired(now), vec![TimerKey::Announce(hash)]);
        assert_eq!(state.take_announcement(&hash).unwrap().origins.len(), 1);
    }

    #[test]
    fn remove_peer_clears_requests_in_flight() {
        let now = Instant::now();
        let mut state = FetchState::default();
        let peer = PeerId::with_last_byte(1);
        let fetched = UnitHash::with_last_byte(1);
        let header = Header { tx_root: B256::with_last_byte(9), ..Default::default() }.seal_slow();

        state.announce(fetched, index(1), origin(1), now);
        let announcement = state.take_announcement(&fetched).unwrap();
        state.start_fetching(fetched, &announcement.origins[0], index(1), now);
        state.announce(header.hash(), index(2), origin(1), now);
        state.take_announcement(&header.hash());
        state.start_completing(
            Completing { peer_id: peer, header: header.clone(), received_at: now },
            now,
        );
        assert!(state.is_busy(&peer));
        assert_eq!(state.charged(&peer), 2);

        assert!(state.remove_peer(&peer).is_empty());
        assert!(!state.is_busy(&peer));
        assert_eq!(state.charged(&peer), 0);
        assert!(!state.is_active(&fetched));
        assert!(!state.is_active(&header.hash()));
        assert_eq!(state.next_deadline(), None);
        assert!(state.take_fetching(&peer, &fetched).is_none());
        assert!(state.take_completing(&peer, &header.tx_root).is_none());
    }

    #[test]
    fn fetching_only_matches_requested_peer() {
        let now = Instant::now();
        let mut state = FetchState::default();
        let hash = UnitHash::with_last_byte(7);
        let peer = PeerId::with_last_byte(1);

        state.announce(hash, index(3), origin(1), now);
        let announcement = state.take_announcement(&hash).unwrap();
        state.start_fetching(hash, &announcement.origins[0], index(3), now);
        assert!(state.is_busy(&peer));
        assert!(state.is_active(&hash));

        assert!(state.take_fetching(&PeerId::with_last_byte(2), &hash).is_none());
        let fetching = state.take_fetching(&peer, &hash).unwrap();
        assert_eq!(fetching.chain_index, index(3));
        assert!(!state.is_busy(&peer));
        assert_eq!(state.charged(&peer), 1);

        state.release(&peer);
        assert_eq!(state.charged(&peer), 0);
    }

    #[test]
    fn completing_matches_by_tx_root() {
        let now = Instant::now();
        let mut state = FetchState::default();
        let peer = PeerId::with_last_byte(1);
        let header = Header { tx_root: B256::with_last_byte(9), ..Default::default() }.seal_slow();

        state.start_completing(
            Completing { peer_id: peer, header: header.clone(), received_at: now },
            now,
        );
        assert!(state.take_completing(&peer, &B256::with_last_byte(8)).is_none());
        assert!(state.take_completing(&PeerId::with_last_byte(2), &header.tx_root).is_none());
        let completing = state.take_completing(&peer, &header.tx_root).unwrap();
        assert_eq!(completing.header, header);
        assert!(!state.is_active(&header.hash()));
    }

    #[test]
    fn remove_peer_keeps_other_origins() {
        let now = Instant::now();
        let mut state = FetchState::default();
        let shared = UnitHash::with_last_byte(1);
        let own = UnitHash::with_last_byte(2);

        state.announce(shared, index(1), origin(1), now);
        state.announce(shared, index(1), origin(2), now);
        state.announce(own, index(2), origin(1), now);

        let removed = state.remove_peer(&PeerId::with_last_byte(1));
        assert_eq!(removed, vec![own]);
        assert!(state.is_announced(&shared));
        assert!(!state.is_announced(&own));
        assert_eq!(state.charged(&PeerId::with_last_byte(1)), 0);
        assert_eq!(state.charged(&PeerId::with_last_byte(2)), 1);
    }
}
