use crate::{proofs::calculate_tx_root, ChainIndex, Header, SealedHeader, Transaction, UnitHash};
use std::ops::Deref;

/// A PalletOne unit: a sealed header and the transactions it commits to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Unit {
    /// Locked unit header.
    pub header: SealedHeader,
    /// Transactions of the unit.
    pub transactions: Vec<Transaction>,
}

impl Unit {
    /// Assembles a unit from its header and body.
    ///
    /// This does not check that the body matches the header, see [`Unit::ensure_tx_root`].
    pub const fn new(header: SealedHeader, transactions: Vec<Transaction>) -> Self {
        Self { header, transactions }
    }

    /// Creates a body-less unit.
    pub const fn with_header(header: SealedHeader) -> Self {
        Self { header, transactions: Vec::new() }
    }

    /// Seals the header and assembles the unit.
    pub fn seal_slow(header: Header, transactions: Vec<Transaction>) -> Self {
        Self::new(header.seal_slow(), transactions)
    }

    /// Header hash.
    pub const fn hash(&self) -> UnitHash {
        self.header.hash()
    }

    /// Position of the unit inside the DAG.
    pub const fn chain_index(&self) -> ChainIndex {
        self.header.header().number
    }

    /// Height of the unit inside its lane.
    pub const fn number(&self) -> u64 {
        self.header.header().number.index
    }

    /// Returns true if the transactions hash to the root committed in the header.
    pub fn ensure_tx_root(&self) -> bool {
        calculate_tx_root(&self.transactions) == self.header.tx_root
    }

    /// Splits the unit into header and body.
    pub fn split(self) -> (SealedHeader, Vec<Transaction>) {
        (self.header, self.transactions)
    }
}

impl Deref for Unit {
    type Target = SealedHeader;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}
