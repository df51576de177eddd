use ptn_primitives::{Unit, UnitHash};
use std::{fmt, sync::Arc};

/// Observes the progress of hashes through the fetcher.
///
/// All methods are called from the fetcher loop and must return quickly.
pub trait FetcherObserver: Send + Sync {
    /// A header batch is about to be requested.
    fn on_fetching(&self, _hashes: &[UnitHash]) {}

    /// A body batch is about to be requested.
    fn on_completing(&self, _hashes: &[UnitHash]) {}

    /// A unit was stored in the Dag.
    fn on_imported(&self, _unit: &Unit) {}

    /// A unit entered (`true`) or left (`false`) the import queue.
    fn on_queue_change(&self, _hash: UnitHash, _added: bool) {}

    /// An announcement was created (`true`) or resolved (`false`).
    fn on_announce_change(&self, _hash: UnitHash, _added: bool) {}
}

/// Optional observer shared with the loop.
#[derive(Clone, Default)]
pub(crate) struct Hooks(Option<Arc<dyn FetcherObserver>>);

impl Hooks {
    pub(crate) fn new(observer: Arc<dyn FetcherObserver>) -> Self {
        Self(Some(observer))
    }

    pub(crate) fn fetching(&self, hashes: &[UnitHash]) {
        if let Some(o) = &self.0 {
            o.on_fetching(hashes)
        }
    }

    pub(crate) fn completing(&self, hashes: &[UnitHash]) {
        if let Some(o) = &self.0 {
            o.on_completing(hashes)
        }
    }

    pub(crate) fn imported(&self, unit: &Unit) {
        if let Some(o) = &self.0 {
            o.on_imported(unit)
        }
    }

    pub(crate) fn queue_change(&self, hash: UnitHash, added: bool) {
        if let Some(o) = &self.0 {
            o.on_queue_change(hash, added)
        }
    }

    pub(crate) fn announce_change(&self, hash: UnitHash, added: bool) {
        if let Some(o) = &self.0 {
            o.on_announce_change(hash, added)
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hooks").field(&self.0.is_some()).finish()
    }
}
