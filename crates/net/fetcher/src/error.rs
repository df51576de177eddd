use ptn_primitives::{UnitHash, UnitNumber};

/// Result alias for results of a header or body request.
pub type RequestResult<T> = Result<T, RequestError>;

/// Error returned when a [`FetcherHandle`](crate::FetcherHandle) can not deliver its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FetcherError {
    /// The fetcher loop is no longer running.
    #[error("unit fetcher terminated")]
    Terminated,
    /// The fetcher is saturated and rejected the message.
    #[error("unit fetcher message buffer is full")]
    ChannelFull,
}

/// Error variants that can happen when sending a request to a peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Closed channel to the peer.
    #[error("closed channel to the peer")]
    ChannelClosed,
    /// Connection to a peer dropped while handling the request.
    #[error("connection to a peer dropped while handling the request")]
    ConnectionDropped,
    /// Any other failure reported by the network layer.
    #[error("{0}")]
    Other(String),
}

/// Errors reported by the Dag when validating or storing units.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    /// The header failed validation.
    #[error("invalid header {hash}: {reason}")]
    InvalidHeader {
        /// Hash of the offending header.
        hash: UnitHash,
        /// What made the header invalid.
        reason: String,
    },
    /// The transactions do not hash to the root committed in the header.
    #[error("transaction root mismatch for unit {hash}")]
    TxRootMismatch {
        /// Hash of the unit.
        hash: UnitHash,
    },
    /// The parent of the unit is not stored.
    #[error("unknown parent for unit {hash} at height {number}")]
    UnknownParent {
        /// Hash of the unit.
        hash: UnitHash,
        /// Height of the unit.
        number: UnitNumber,
    },
    /// The storage rejected the write.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Error returned by a batch insert, carrying the number of units stored before the failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to insert unit at batch index {inserted}: {error}")]
pub struct InsertUnitsError {
    /// Number of units of the batch that were stored. This is also the index of the failing unit.
    pub inserted: usize,
    /// Why the unit at index `inserted` was rejected.
    #[source]
    pub error: UnitError,
}

impl InsertUnitsError {
    /// Creates a new error.
    pub const fn new(inserted: usize, error: UnitError) -> Self {
        Self { inserted, error }
    }
}
