//! Commonly used types in ptn.
//!
//! A PalletOne ledger is made of many independent asset lanes. Every lane is a chain of
//! [`Unit`]s, each unit being a [`Header`] plus the list of [`Transaction`]s it commits to via the
//! header's transaction root.
//!
//! ## Feature Flags
//!
//! - `serde`: Enables `serde` support for the primitive types.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod chain_index;
pub mod constants;
mod header;
mod peer;
pub mod proofs;
mod transaction;
mod unit;

pub use chain_index::{AssetId, ChainIndex};
pub use constants::EMPTY_TX_ROOT;
pub use header::{Header, SealedHeader};
pub use peer::{PeerId, WithPeerId};
pub use transaction::Transaction;
pub use unit::Unit;

pub use alloy_primitives::{keccak256, Address, Bytes, B256};

/// A unit hash.
pub type UnitHash = B256;
/// A transaction hash.
pub type TxHash = B256;
/// A unit height inside its asset lane.
pub type UnitNumber = u64;
