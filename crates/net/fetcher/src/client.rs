//! Capabilities the fetcher needs from the rest of the node.

use crate::error::{InsertUnitsError, RequestResult, UnitError};
use ptn_primitives::{AssetId, PeerId, SealedHeader, Unit, UnitHash};
use std::sync::Arc;

/// Requests the header of the given unit from the peer it is bound to.
///
/// Must not block: the fetcher calls it from its own loop.
pub type HeaderRequester = Arc<dyn Fn(UnitHash) -> RequestResult<()> + Send + Sync>;

/// Requests the bodies of the given units from the peer it is bound to.
///
/// Must not block: the fetcher calls it from its own loop.
pub type BodyRequester = Arc<dyn Fn(Vec<UnitHash>) -> RequestResult<()> + Send + Sync>;

/// Access to the local Dag.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait DagClient: Send + Sync {
    /// Returns true if the unit is already stored.
    fn exists(&self, hash: &UnitHash) -> bool;

    /// Lightweight validation of a header received from the network.
    fn verify_header(&self, header: &SealedHeader) -> Result<(), UnitError>;

    /// Height of the local head of the asset lane.
    fn chain_height(&self, asset: AssetId) -> u64;

    /// Stores the units in order and returns how many were stored.
    ///
    /// A unit at or below the lane head is skipped without error. On failure the error carries the
    /// number of units stored before the failing one.
    fn insert_units(&self, units: Vec<Unit>) -> Result<usize, InsertUnitsError>;
}

/// Access to the peer to peer layer.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait NetworkClient: Send + Sync {
    /// Announces (`propagate == false`) or pushes (`propagate == true`) the unit to peers.
    fn broadcast_unit(&self, unit: &Unit, propagate: bool);

    /// Disconnects a misbehaving peer.
    fn drop_peer(&self, peer_id: PeerId);
}
