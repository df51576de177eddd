use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// The unit fetcher metrics.
#[derive(Metrics)]
#[metrics(scope = "fetcher")]
pub(crate) struct FetcherMetrics {
    /// Number of incoming announcements
    pub(crate) announces_in: Counter,
    /// Number of announcements rejected as already stored or too far from the head
    pub(crate) announces_dropped: Counter,
    /// Number of announcements rejected because the peer reached its limit
    pub(crate) announces_dos: Counter,
    /// Number of units pushed directly by peers
    pub(crate) broadcasts_in: Counter,
    /// Number of pushed units rejected as known, too far or invalid
    pub(crate) broadcasts_dropped: Counter,
    /// Number of pushed units rejected because the import queue was full
    pub(crate) broadcasts_dos: Counter,
    /// Number of header requests sent
    pub(crate) header_fetches: Counter,
    /// Number of body requests sent (one per hash)
    pub(crate) body_fetches: Counter,
    /// Number of headers handed to the fetcher
    pub(crate) filter_headers_in: Counter,
    /// Number of headers handed back unconsumed
    pub(crate) filter_headers_out: Counter,
    /// Number of transaction lists handed to the fetcher
    pub(crate) filter_bodies_in: Counter,
    /// Number of transaction lists handed back unconsumed
    pub(crate) filter_bodies_out: Counter,
    /// Number of header or body requests that expired
    pub(crate) timeouts: Counter,
    /// Number of units stored through the fetcher
    pub(crate) imported_units: Counter,
    /// Number of peers disconnected for misbehaviour
    pub(crate) dropped_peers: Counter,
    /// Number of announcements waiting for dispatch
    pub(crate) pending_announces: Gauge,
    /// Number of units waiting for import
    pub(crate) queued_units: Gauge,
}
