use crate::{constants::EMPTY_TX_ROOT, AssetId, ChainIndex, UnitHash};
use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_rlp::RlpEncodable;
use std::ops::Deref;

/// Unit header.
///
/// The header commits to the unit's transactions through [`Header::tx_root`], so the header hash
/// identifies the whole unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, RlpEncodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    /// Hashes of the parent units.
    pub parents_hash: Vec<B256>,
    /// The mediator that produced the unit.
    pub author: Address,
    /// Root of the transactions contained in the unit.
    pub tx_root: B256,
    /// Position of the unit inside the DAG.
    pub number: ChainIndex,
    /// Arbitrary producer data.
    pub extra: Bytes,
    /// Creation time in seconds since the unix epoch.
    pub time: u64,
}

impl Header {
    /// Returns the first parent hash, the one inside the same asset lane.
    pub fn parent_hash(&self) -> Option<B256> {
        self.parents_hash.first().copied()
    }

    /// Returns the height of the unit inside its lane.
    pub const fn height(&self) -> u64 {
        self.number.index
    }

    /// Returns the asset lane of the unit.
    pub const fn asset_id(&self) -> AssetId {
        self.number.asset_id
    }

    /// Returns true if the header commits to an empty transaction list.
    ///
    /// Such a header describes a complete unit on its own.
    pub fn is_empty(&self) -> bool {
        self.tx_root == EMPTY_TX_ROOT
    }

    /// Heavy function that computes the hash of the RLP encoded header.
    pub fn hash_slow(&self) -> UnitHash {
        keccak256(alloy_rlp::encode(self))
    }

    /// Calculates the hash and seals the header.
    pub fn seal_slow(self) -> SealedHeader {
        let hash = self.hash_slow();
        SealedHeader { header: self, hash }
    }
}

/// A [`Header`] that is sealed with its precalculated hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SealedHeader {
    header: Header,
    hash: UnitHash,
}

impl SealedHeader {
    /// Creates the sealed header without recomputing the hash.
    ///
    /// The caller guarantees that `hash` is the hash of `header`.
    pub const fn new_unchecked(header: Header, hash: UnitHash) -> Self {
        Self { header, hash }
    }

    /// Returns the sealed hash.
    pub const fn hash(&self) -> UnitHash {
        self.hash
    }

    /// Returns the inner header.
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// Extracts the raw header.
    pub fn unseal(self) -> Header {
        self.header
    }

    /// Splits into the header and its hash.
    pub fn split(self) -> (Header, UnitHash) {
        (self.header, self.hash)
    }
}

impl Deref for SealedHeader {
    type Target = Header;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_covers_chain_index() {
        let header = Header {
            number: ChainIndex::new(AssetId::with_last_byte(1), 1),
            tx_root: EMPTY_TX_ROOT,
            ..Default::default()
        };
        let mut other = header.clone();
        other.number.index = 2;

        assert_ne!(header.hash_slow(), other.hash_slow());
        assert_eq!(header.clone().seal_slow().hash(), header.hash_slow());
    }

    #[test]
    fn empty_header() {
        let header = Header { tx_root: EMPTY_TX_ROOT, ..Default::default() };
        assert!(header.is_empty());
        assert!(!Header::default().is_empty());
    }
}
