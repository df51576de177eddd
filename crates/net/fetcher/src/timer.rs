//! Due time tracking for announcements and outstanding requests.

use ptn_primitives::UnitHash;
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};
use tokio::time::Instant;

/// What a deadline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum TimerKey {
    /// Announcement is due for dispatch.
    Announce(UnitHash),
    /// Header request expires.
    Header(UnitHash),
    /// Body request expires.
    Body(UnitHash),
}

/// A min-heap of deadlines.
///
/// Rescheduling or cancelling a key leaves its old heap entry in place, stale entries are skipped
/// when they surface and the heap is rebuilt once they outnumber live ones.
#[derive(Debug, Default)]
pub(crate) struct Deadlines {
    heap: BinaryHeap<Reverse<(Instant, TimerKey)>>,
    live: HashMap<TimerKey, Instant>,
}

impl Deadlines {
    /// Sets the deadline of `key`, replacing any previous one.
    pub(crate) fn schedule(&mut self, key: TimerKey, at: Instant) {
        self.live.insert(key, at);
        self.heap.push(Reverse((at, key)));
        self.maybe_compact();
    }

    /// Forgets the deadline of `key`.
    pub(crate) fn cancel(&mut self, key: &TimerKey) {
        self.live.remove(key);
        self.maybe_compact();
    }

    /// Earliest live deadline.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((at, key))) = self.heap.peek() {
            if self.live.get(key) == Some(at) {
                return Some(*at)
            }
            self.heap.pop();
        }
        None
    }

    /// Removes and returns every key whose deadline is at or before `now`, earliest first.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Vec<TimerKey> {
        let mut expired = Vec::new();
        while let Some(at) = self.next_deadline() {
            if at > now {
                break
            }
            if let Some(Reverse((_, key))) = self.heap.pop() {
                self.live.remove(&key);
                expired.push(key);
            }
        }
        expired
    }

    fn maybe_compact(&mut self) {
        if self.heap.len() > 64 && self.heap.len() > 2 * self.live.len() {
            self.heap = self.live.iter().map(|(key, at)| Reverse((*at, *key))).collect();
        }
    }
}
