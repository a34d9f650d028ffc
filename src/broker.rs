//! Broker collaborator interface & lead broker discovery.
//!
//! The broker wire protocol itself lives behind the [`BrokerClient`] trait;
//! this module only specifies the calls the ingestion core depends upon:
//! partition-metadata lookup, earliest-offset lookup and sequential fetch.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single broker endpoint.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Metadata describing one partition of a topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionMetadata {
    /// The broker protocol error code, `0` meaning no error.
    pub error_code: i16,
    /// The broker currently leading the partition, if any.
    pub leader: Option<BrokerEndpoint>,
}

/// A client of the external message broker.
///
/// Implementations are expected to surface connection-level failures as
/// errors; the core applies no timeouts of its own.
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Query partition metadata from any of the given candidate brokers.
    async fn partition_metadata(&self, topic: &str, partition: u32, brokers: &[BrokerEndpoint]) -> Result<PartitionMetadata>;

    /// Query the earliest offset still available for the partition.
    async fn earliest_offset(&self, topic: &str, partition: u32, broker: &BrokerEndpoint) -> Result<u64>;

    /// Fetch a batch of sequential messages beginning at the given offset,
    /// bounded by `max_bytes` of payload.
    ///
    /// Returned pairs are `(offset, payload)` in ascending offset order. An
    /// empty batch indicates no data is currently available.
    async fn fetch(&self, topic: &str, partition: u32, offset: u64, max_bytes: usize, broker: &BrokerEndpoint) -> Result<Vec<(u64, Bytes)>>;
}

/// Locate the broker currently leading the given topic partition.
///
/// Yields `Ok(None)` when the metadata response carries a non-zero error code
/// or reports no leader. No retry across candidates is performed; callers
/// treat `None` as fatal for the startup attempt.
pub async fn locate_lead_broker(
    client: &Arc<dyn BrokerClient>, topic: &str, partition: u32, brokers: &[BrokerEndpoint],
) -> Result<Option<BrokerEndpoint>> {
    let metadata = client.partition_metadata(topic, partition, brokers).await?;
    if metadata.error_code != 0 {
        tracing::warn!(topic, partition, error_code = metadata.error_code, "partition metadata query returned error code");
        return Ok(None);
    }
    Ok(metadata.leader)
}
