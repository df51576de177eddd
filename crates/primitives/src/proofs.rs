//! Helper functions for calculating unit commitments.

use crate::{Transaction, TxHash};
use alloy_primitives::{keccak256, B256};

/// Calculates the transaction root for the given transactions.
///
/// The root is the hash of the RLP list of transaction hashes, so the empty list maps to
/// [`EMPTY_TX_ROOT`](crate::EMPTY_TX_ROOT).
pub fn calculate_tx_root(transactions: &[Transaction]) -> B256 {
    let hashes: Vec<TxHash> = transactions.iter().map(Transaction::hash).collect();
    keccak256(alloy_rlp::encode(&hashes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EMPTY_TX_ROOT;
    use alloy_primitives::Bytes;

    #[test]
    fn empty_root() {
        assert_eq!(calculate_tx_root(&[]), EMPTY_TX_ROOT);
    }

    #[test]
    fn root_depends_on_order() {
        let a = Transaction::new(1, Bytes::from_static(b"a"));
        let b = Transaction::new(1, Bytes::from_static(b"b"));
        assert_ne!(
            calculate_tx_root(&[a.clone(), b.clone()]),
            calculate_tx_root(&[b, a])
        );
    }
}
