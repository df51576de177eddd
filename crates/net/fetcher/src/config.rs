//! Configuration for the unit fetcher.

use std::time::Duration;

/// Time allowance before an announced unit is explicitly requested, and the maximum wait for the
/// answer to an outstanding header or body request.
pub const DEFAULT_ARRIVE_TIMEOUT: Duration = Duration::from_millis(500);

/// Window during which announcements of the same hash are gathered into a single fetch.
pub const DEFAULT_GATHER_SLACK: Duration = Duration::from_millis(100);

/// Maximum number of unresolved announcements a single peer may have.
pub const DEFAULT_HASH_LIMIT: usize = 256;

/// Maximum number of assembled units waiting for import.
pub const DEFAULT_BLOCK_LIMIT: usize = 64;

/// Maximum distance between an announced height and the local lane head.
pub const DEFAULT_MAX_QUEUE_DIST: u64 = 32;

/// Capacity of the channel between [`FetcherHandle`](crate::FetcherHandle)s and the fetcher.
pub const DEFAULT_MESSAGE_BUFFER: usize = 4096;

/// Configuration for the [`UnitFetcher`](crate::UnitFetcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FetcherConfig {
    /// Maximum wait for a response to an outstanding request before its state is purged.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub arrive_timeout: Duration,
    /// Time window for batching near-simultaneous announcements of the same hash.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub gather_slack: Duration,
    /// Maximum unresolved announcements per peer, further announcements are rejected.
    pub hash_limit: usize,
    /// Maximum assembled units held pending import, the furthest from head are evicted first.
    pub block_limit: usize,
    /// Maximum acceptable distance between an announced height and the local head.
    pub max_queue_dist: u64,
    /// Capacity of the handle channel. Messages are rejected while it is full.
    pub message_buffer: usize,
}

impl FetcherConfig {
    /// Sets the arrive timeout.
    pub const fn with_arrive_timeout(mut self, arrive_timeout: Duration) -> Self {
        self.arrive_timeout = arrive_timeout;
        self
    }

    /// Sets the gather slack.
    pub const fn with_gather_slack(mut self, gather_slack: Duration) -> Self {
        self.gather_slack = gather_slack;
        self
    }

    /// Sets the per peer announcement limit.
    pub const fn with_hash_limit(mut self, hash_limit: usize) -> Self {
        self.hash_limit = hash_limit;
        self
    }

    /// Sets the import queue limit.
    pub const fn with_block_limit(mut self, block_limit: usize) -> Self {
        self.block_limit = block_limit;
        self
    }

    /// Sets the maximum distance from the local head.
    pub const fn with_max_queue_dist(mut self, max_queue_dist: u64) -> Self {
        self.max_queue_dist = max_queue_dist;
        self
    }

    /// Sets the handle channel capacity.
    pub const fn with_message_buffer(mut self, message_buffer: usize) -> Self {
        self.message_buffer = message_buffer;
        self
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            arrive_timeout: DEFAULT_ARRIVE_TIMEOUT,
            gather_slack: DEFAULT_GATHER_SLACK,
            hash_limit: DEFAULT_HASH_LIMIT,
            block_limit: DEFAULT_BLOCK_LIMIT,
            max_queue_dist: DEFAULT_MAX_QUEUE_DIST,
            message_buffer: DEFAULT_MESSAGE_BUFFER,
        }
    }
}
