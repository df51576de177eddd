//! Announcement driven unit retrieval.
//!
//! Peers tell the node about new units either by announcing their hash or by pushing the whole
//! unit. The [`UnitFetcher`] turns both into units stored in the local Dag: it gathers duplicate
//! announcements, fetches headers and bodies from the announcing peers, verifies what it receives,
//! orders the assembled units by chain index and inserts them once they connect to the head of
//! their asset lane.
//!
//! The fetcher talks to the node through two capability traits, [`DagClient`] for storage and
//! [`NetworkClient`] for the peer to peer layer, and is fed through a [`FetcherHandle`].
//!
//! ## Feature Flags
//!
//! - `serde`: Enables serde support for [`FetcherConfig`].
//! - `test-utils`: Export utilities for testing.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod client;
mod config;
mod error;
mod fetcher;
mod handle;
mod hooks;
mod metrics;
mod queue;
mod state;
mod timer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{BodyRequester, DagClient, HeaderRequester, NetworkClient};
pub use config::*;
pub use error::{FetcherError, InsertUnitsError, RequestError, RequestResult, UnitError};
pub use fetcher::{FetcherService, UnitFetcher};
pub use handle::FetcherHandle;
pub use hooks::FetcherObserver;
