//! Units waiting for import, ordered by chain index.

use ptn_primitives::{AssetId, PeerId, Unit, UnitHash, WithPeerId};
use std::collections::{BTreeMap, HashMap};

/// A queued unit together with the peer that delivered it.
pub(crate) type QueuedUnit = WithPeerId<Unit>;

/// Assembled units, one ordered lane per asset.
#[derive(Debug, Default)]
pub(crate) struct ImportQueue {
    lanes: BTreeMap<AssetId, BTreeMap<(u64, UnitHash), QueuedUnit>>,
    index: HashMap<UnitHash, (AssetId, u64)>,
}

impl ImportQueue {
    /// Queues the unit, returns false if it is already queued.
    pub(crate) fn insert(&mut self, peer_id: PeerId, unit: Unit) -> bool {
        let hash = unit.hash();
        if self.index.contains_key(&hash) {
            return false
        }
        let index = unit.chain_index();
        self.index.insert(hash, (index.asset_id, index.index));
        self.lanes
            .entry(index.asset_id)
            .or_default()
            .insert((index.index, hash), WithPeerId::new(peer_id, unit));
        true
    }

    pub(crate) fn contains(&self, hash: &UnitHash) -> bool {
        self.index.contains_key(hash)
    }

    pub(crate) fn remove(&mut self, hash: &UnitHash) -> Option<QueuedUnit> {
        let (asset, height) = self.index.remove(hash)?;
        let lane = self.lanes.get_mut(&asset)?;
        let unit = lane.remove(&(height, *hash));
        if lane.is_empty() {
            self.lanes.remove(&asset);
        }
        unit
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    /// Assets with at least one queued unit.
    pub(crate) fn assets(&self) -> Vec<AssetId> {
        self.lanes.keys().copied().collect()
    }

    /// Queued units of the lane, lowest height first.
    pub(crate) fn lane(&self, asset: &AssetId) -> impl Iterator<Item = &QueuedUnit> + '_ {
        self.lanes.get(asset).into_iter().flat_map(|lane| lane.values())
    }

    /// Removes the unit furthest from its lane head, as reported by `head`.
    ///
    /// Ties go to the higher unit.
    pub(crate) fn evict_furthest(&mut self, head: impl Fn(AssetId) -> u64) -> Option<QueuedUnit> {
        let mut furthest: Option<(u64, u64, UnitHash)> = None;
        for (asset, lane) in &self.lanes {
            let lane_head = head(*asset);
            let ends = lane.keys().next().into_iter().chain(lane.keys().next_back());
            for (height, hash) in ends {
                let distance = height.abs_diff(lane_head);
                let further = furthest.map_or(true, |(best, best_height, _)| {
                    distance > best || (distance == best && *height > best_height)
                });
                if further {
                    furthest = Some((distance, *height, *hash));
                }
            }
        }
        let (_, _, hash) = furthest?;
        self.remove(&hash)
    }
}
