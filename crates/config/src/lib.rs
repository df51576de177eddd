//! Standalone crate for ptn configuration types.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use ptn_fetcher::FetcherConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use confy::ConfyError;

/// Configuration for the ptn node.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for the unit fetcher.
    pub fetcher: FetcherConfig,
}

impl Config {
    /// Loads the configuration from the TOML file at `path`.
    ///
    /// A missing file is created with the default configuration.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfyError> {
        confy::load_path(path)
    }

    /// Writes the configuration as TOML to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfyError> {
        confy::store_path(path, self)
    }
}
