use crate::TxHash;
use alloy_primitives::{keccak256, Bytes};
use alloy_rlp::RlpEncodable;

/// A transaction carried in a unit body.
///
/// The fetcher treats transactions as opaque payloads; only their hashes matter for the
/// transaction root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, RlpEncodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transaction {
    /// Format version of the payload.
    pub version: u32,
    /// Encoded transaction messages.
    pub payload: Bytes,
}

impl Transaction {
    /// Creates a new transaction.
    pub const fn new(version: u32, payload: Bytes) -> Self {
        Self { version, payload }
    }

    /// Hash of the RLP encoded transaction.
    pub fn hash(&self) -> TxHash {
        keccak256(alloy_rlp::encode(self))
    }
}
