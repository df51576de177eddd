use alloy_primitives::FixedBytes;
use alloy_rlp::RlpEncodable;
use std::fmt;

/// Identifier of an asset lane.
///
/// Every asset runs its own independent chain of units inside the DAG.
pub type AssetId = FixedBytes<16>;

/// Position of a unit inside the DAG: the asset lane it belongs to and its height in that lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, RlpEncodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainIndex {
    /// The asset lane.
    pub asset_id: AssetId,
    /// Height of the unit inside the lane.
    pub index: u64,
}

impl ChainIndex {
    /// Creates a new index.
    pub const fn new(asset_id: AssetId, index: u64) -> Self {
        Self { asset_id, index }
    }

    /// Returns the absolute distance between this index and the given lane height.
    pub const fn distance(&self, height: u64) -> u64 {
        self.index.abs_diff(height)
    }

    /// Returns the index of the next unit in the same lane.
    pub const fn next(&self) -> Self {
        Self { asset_id: self.asset_id, index: self.index + 1 }
    }
}

impl fmt::Display for ChainIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asset_id, self.index)
    }
}
