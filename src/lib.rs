//! Streaming-ingestion bootstrap.
//!
//! This crate binds one partition of an external partitioned broker topic to a
//! durable indexed-storage segment and supervises the lifecycle of that
//! binding: it discovers the partition's lead broker, recovers a safe resume
//! offset across restarts, verifies the destination storage exists, then runs
//! a raw-record intake stage and a structured index-build stage concurrently
//! with backpressure and coordinated shutdown.
//!
//! The broker wire protocol, the index catalog and the segment storage are
//! collaborators behind trait seams ([`broker::BrokerClient`],
//! [`index::IndexCatalog`], [`index::SegmentStore`]); the embedding
//! application supplies implementations, assembles a
//! [`bootstrap::Bootstrap`] and wires its own termination handling to
//! [`bootstrap::Bootstrap::stop`].

pub mod bootstrap;
pub mod broker;
pub mod build;
pub mod config;
pub mod error;
pub mod index;
pub mod intake;
pub mod parser;
pub mod telemetry;

#[cfg(test)]
mod fixtures;


pub use bootstrap::Bootstrap;
pub use config::{Config, StreamSource};
pub use error::{IngestError, IngestResult};
pub use intake::StreamRecord;
