//! Ingestion error abstractions.

use thiserror::Error;

/// Fatal errors surfaced by the bootstrap coordinator.
///
/// Every variant is terminal for the `start()` attempt which produced it;
/// retry policy belongs to the supervisor which invoked the coordinator.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No stream source configuration was found for the given name.
    #[error("no stream source configuration found for '{0}'")]
    ConfigurationMissing(String),
    /// The destination index instance is absent or has no segments.
    #[error("index resource missing or empty: {0}")]
    ResourceMissing(String),
    /// No lead broker could be located for the partition.
    #[error("could not locate lead broker for {topic}/{partition}")]
    BrokerUnavailable { topic: String, partition: u32 },
    /// The destination storage location does not exist.
    #[error("storage location '{0}' does not exist, create it before starting ingestion")]
    StorageNotProvisioned(String),
    /// A pipeline is already registered and running under the given key.
    #[error("an ingestion pipeline is already running for '{0}'")]
    DuplicatePipeline(String),
    /// An error raised inside the intake or build stage while running.
    #[error("stream processing failure: {0}")]
    StreamProcessing(#[source] anyhow::Error),
}

/// A result type whose error is an `IngestError`.
pub type IngestResult<T> = ::std::result::Result<T, IngestError>;
