use crate::{
    client::{BodyRequester, HeaderRequester},
    error::FetcherError,
};
use ptn_primitives::{ChainIndex, PeerId, SealedHeader, Transaction, Unit, UnitHash};
use std::fmt;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    time::Instant,
};

/// Messages consumed by the fetcher loop.
pub(crate) enum FetcherMessage {
    Notify {
        peer_id: PeerId,
        hash: UnitHash,
        chain_index: ChainIndex,
        time: Instant,
        header_requester: HeaderRequester,
        body_requester: BodyRequester,
    },
    Enqueue {
        peer_id: PeerId,
        unit: Unit,
    },
    FilterHeaders {
        peer_id: PeerId,
        headers: Vec<SealedHeader>,
        time: Instant,
        tx: oneshot::Sender<Vec<SealedHeader>>,
    },
    FilterBodies {
        peer_id: PeerId,
        bodies: Vec<Vec<Transaction>>,
        time: Instant,
        tx: oneshot::Sender<Vec<Vec<Transaction>>>,
    },
    RemovePeer(PeerId),
}

impl fmt::Debug for FetcherMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notify { peer_id, hash, chain_index, .. } => f
                .debug_struct("Notify")
                .field("peer_id", peer_id)
                .field("hash", hash)
                .field("chain_index", chain_index)
                .finish_non_exhaustive(),
            Self::Enqueue { peer_id, unit } => f
                .debug_struct("Enqueue")
                .field("peer_id", peer_id)
                .field("hash", &unit.hash())
                .finish(),
            Self::FilterHeaders { peer_id, headers, .. } => f
                .debug_struct("FilterHeaders")
                .field("peer_id", peer_id)
                .field("len", &headers.len())
                .finish_non_exhaustive(),
            Self::FilterBodies { peer_id, bodies, .. } => f
                .debug_struct("FilterBodies")
                .field("peer_id", peer_id)
                .field("len", &bodies.len())
                .finish_non_exhaustive(),
            Self::RemovePeer(peer_id) => f.debug_tuple("RemovePeer").field(peer_id).finish(),
        }
    }
}

/// Front-end API for feeding the [`UnitFetcher`](crate::UnitFetcher).
///
/// Cheap to clone. All methods only enqueue a message, the fetcher loop does the work.
#[derive(Debug, Clone)]
pub struct FetcherHandle {
    to_fetcher: mpsc::Sender<FetcherMessage>,
}

impl FetcherHandle {
    pub(crate) const fn new(to_fetcher: mpsc::Sender<FetcherMessage>) -> Self {
        Self { to_fetcher }
    }

    /// Announces that `peer_id` has the unit `hash` at `chain_index`.
    ///
    /// `time` is when the announcement arrived. The requesters are used if the hash is fetched
    /// from this peer.
    pub fn notify(
        &self,
        peer_id: PeerId,
        hash: UnitHash,
        chain_index: ChainIndex,
        time: Instant,
        header_requester: HeaderRequester,
        body_requester: BodyRequester,
    ) -> Result<(), FetcherError> {
        self.try_send(FetcherMessage::Notify {
            peer_id,
            hash,
            chain_index,
            time,
            header_requester,
            body_requester,
        })
    }

    /// Hands over a complete unit pushed by `peer_id`.
    pub fn enqueue(&self, peer_id: PeerId, unit: Unit) -> Result<(), FetcherError> {
        self.try_send(FetcherMessage::Enqueue { peer_id, unit })
    }

    /// Offers headers received from `peer_id`, returns the ones the fetcher did not request.
    pub async fn filter_headers(
        &self,
        peer_id: PeerId,
        headers: Vec<SealedHeader>,
        time: Instant,
    ) -> Result<Vec<SealedHeader>, FetcherError> {
        let (tx, rx) = oneshot::channel();
        self.send(FetcherMessage::FilterHeaders { peer_id, headers, time, tx }).await?;
        rx.await.map_err(|_| FetcherError::Terminated)
    }

    /// Offers unit bodies received from `peer_id`, returns the ones the fetcher did not request.
    pub async fn filter_bodies(
        &self,
        peer_id: PeerId,
        bodies: Vec<Vec<Transaction>>,
        time: Instant,
    ) -> Result<Vec<Vec<Transaction>>, FetcherError> {
        let (tx, rx) = oneshot::channel();
        self.send(FetcherMessage::FilterBodies { peer_id, bodies, time, tx }).await?;
        rx.await.map_err(|_| FetcherError::Terminated)
    }

    /// Forgets all pending work attributed to the disconnected peer.
    pub fn remove_peer(&self, peer_id: PeerId) -> Result<(), FetcherError> {
        self.try_send(FetcherMessage::RemovePeer(peer_id))
    }

    /// Returns true if the fetcher loop is gone.
    pub fn is_terminated(&self) -> bool {
        self.to_fetcher.is_closed()
    }

    fn try_send(&self, msg: FetcherMessage) -> Result<(), FetcherError> {
        self.to_fetcher.try_send(msg).map_err(|err| match err {
            TrySendError::Full(_) => FetcherError::ChannelFull,
            TrySendError::Closed(_) => FetcherError::Terminated,
        })
    }

    async fn send(&self, msg: FetcherMessage) -> Result<(), FetcherError> {
        self.to_fetcher.send(msg).await.map_err(|_| FetcherError::Terminated)
    }
}
