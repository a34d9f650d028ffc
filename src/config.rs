//! Runtime configuration.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::broker::BrokerEndpoint;

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The process logging config, which uses Rust's `env_logger` directives.
    pub rust_log: String,
    /// The path to the stream source definitions file.
    pub sources_path: String,

    /// All known stream sources, keyed by stream name.
    ///
    /// This value is loaded from the file at `sources_path`.
    #[serde(skip, default)]
    pub sources: HashMap<String, StreamSource>,
}

/// The immutable configuration of one ingestion unit.
///
/// A stream source binds a broker topic to a destination index and is
/// read-only for the lifetime of any pipeline started from it.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct StreamSource {
    /// The broker topic to ingest from.
    pub topic: String,
    /// The name of the destination index instance.
    pub index: String,
    /// The candidate broker endpoints for metadata discovery.
    pub brokers: Vec<BrokerEndpoint>,
    /// The maximum number of payload bytes requested per broker fetch.
    #[serde(default = "StreamSource::default_fetch_max_bytes")]
    pub fetch_max_bytes: usize,
    /// The capacity of the bounded queue between the intake and build stages.
    #[serde(default = "StreamSource::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl StreamSource {
    fn default_fetch_max_bytes() -> usize {
        1024 * 1024
    }

    fn default_queue_capacity() -> usize {
        1024
    }
}

impl Config {
    /// Create a new config instance.
    ///
    /// This parses the runtime environment and then loads the stream source
    /// definitions file which the environment points to.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        let config: Config = envy::from_env().context("error building config from env")?;
        config.load_sources()
    }

    /// Load the stream source definitions file this config points to.
    pub(crate) fn load_sources(mut self) -> Result<Self> {
        let raw = std::fs::read_to_string(&self.sources_path)
            .with_context(|| format!("error reading stream source definitions from {}", self.sources_path))?;
        self.sources = serde_yaml::from_str(&raw).context("error parsing stream source definitions")?;
        Ok(self)
    }

    /// Resolve the stream source configuration for the given stream name.
    pub fn source(&self, stream: &str) -> Option<&StreamSource> {
        self.sources.get(stream)
    }
}
