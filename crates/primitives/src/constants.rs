//! Ptn protocol-related constants

use alloy_primitives::{b256, B256};

/// Root of an empty transaction list: `keccak256(rlp([]))`.
///
/// A header carrying this root describes a unit without a body.
pub const EMPTY_TX_ROOT: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");
