use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use rand::prelude::*;

use crate::broker::{BrokerClient, BrokerEndpoint, PartitionMetadata};
use crate::config::{Config, StreamSource};
use crate::index::{IndexCatalog, IndexInstance, IndexSegment, SegmentStore, StructuredRow};

/// The maximum number of records returned per fetch from the memory broker.
const FETCH_BATCH_LIMIT: usize = 10;

/// Build a broker endpoint for use in tests.
pub fn endpoint(host: &str) -> BrokerEndpoint {
    BrokerEndpoint { host: host.to_string(), port: 9092 }
}

/// Build a stream source bound to the given topic and index.
pub fn stream_source(topic: &str, index: &str) -> StreamSource {
    StreamSource {
        topic: topic.to_string(),
        index: index.to_string(),
        brokers: vec![endpoint("broker-0"), endpoint("broker-1")],
        fetch_max_bytes: 1024 * 1024,
        queue_capacity: 64,
    }
}

/// Build a config holding the given stream source under the given name.
pub fn config_with_source(stream: &str, source: StreamSource) -> Arc<Config> {
    let mut sources = HashMap::new();
    sources.insert(stream.to_string(), source);
    Arc::new(Config {
        rust_log: "error".to_string(),
        sources_path: "/dev/null".to_string(),
        sources,
    })
}

/// Generate a run of sequential JSON records beginning at the given offset.
///
/// Payloads carry `user` and `action` fields matching the fixture index
/// column schema.
pub fn json_records(start_offset: u64, count: usize) -> Vec<(u64, Bytes)> {
    (0..count as u64)
        .map(|n| {
            let offset = start_offset + n;
            let payload = format!(r#"{{"user":"user-{}","action":"click"}}"#, offset);
            (offset, Bytes::from(payload))
        })
        .collect()
}

/// Generate a randomly sized run of sequential JSON records.
pub fn some_json_records(start_offset: u64) -> Vec<(u64, Bytes)> {
    json_records(start_offset, rand::thread_rng().gen_range(50..100))
}

/// Build an index instance with a single provisioned segment.
pub fn index_instance(name: &str, partition: u32, persisted_offset: u64) -> IndexInstance {
    IndexInstance {
        name: name.to_string(),
        columns: vec!["user".to_string(), "action".to_string()],
        segments: vec![IndexSegment {
            name: format!("{}_seg_0", name),
            storage_location: format!("storage/{}_seg_0", name),
        }],
        stream_offsets: HashMap::from([(partition, persisted_offset)]),
    }
}

/// An in-memory broker scripted with fixed metadata and records.
pub struct MemoryBroker {
    metadata: PartitionMetadata,
    earliest: u64,
    records: Mutex<Vec<(u64, Bytes)>>,
    pub metadata_calls: AtomicU64,
    pub earliest_calls: AtomicU64,
    pub fetch_calls: AtomicU64,
}

impl MemoryBroker {
    /// Create a broker leading from `broker-0` with the given record log.
    pub fn new(earliest: u64, records: Vec<(u64, Bytes)>) -> Arc<Self> {
        Self::with_metadata(PartitionMetadata { error_code: 0, leader: Some(endpoint("broker-0")) }, earliest, records)
    }

    /// Create a broker with fully scripted partition metadata.
    pub fn with_metadata(metadata: PartitionMetadata, earliest: u64, records: Vec<(u64, Bytes)>) -> Arc<Self> {
        Arc::new(Self {
            metadata,
            earliest,
            records: Mutex::new(records),
            metadata_calls: AtomicU64::new(0),
            earliest_calls: AtomicU64::new(0),
            fetch_calls: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn partition_metadata(&self, _topic: &str, _partition: u32, _brokers: &[BrokerEndpoint]) -> Result<PartitionMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata.clone())
    }

    async fn earliest_offset(&self, _topic: &str, _partition: u32, _broker: &BrokerEndpoint) -> Result<u64> {
        self.earliest_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.earliest)
    }

    async fn fetch(&self, _topic: &str, _partition: u32, offset: u64, _max_bytes: usize, _broker: &BrokerEndpoint) -> Result<Vec<(u64, Bytes)>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let records = self.records.lock().expect("fixture lock poisoned");
        Ok(records.iter().filter(|(rec_offset, _)| *rec_offset >= offset).take(FETCH_BATCH_LIMIT).cloned().collect())
    }
}

/// An in-memory index catalog.
pub struct MemoryCatalog {
    indexes: HashMap<String, IndexInstance>,
    pub get_calls: AtomicU64,
}

impl MemoryCatalog {
    pub fn new(indexes: Vec<IndexInstance>) -> Arc<Self> {
        let indexes = indexes.into_iter().map(|index| (index.name.clone(), index)).collect();
        Arc::new(Self { indexes, get_calls: AtomicU64::new(0) })
    }
}

#[async_trait]
impl IndexCatalog for MemoryCatalog {
    async fn get_index(&self, name: &str) -> Result<Option<IndexInstance>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.indexes.get(name).cloned())
    }
}

/// An in-memory segment store recording appended rows per location.
pub struct MemoryStore {
    locations: HashSet<String>,
    rows: Mutex<HashMap<String, Vec<StructuredRow>>>,
    append_delay: Option<std::time::Duration>,
    fail_appends: bool,
}

impl MemoryStore {
    /// Create a store with the given provisioned storage locations.
    pub fn new<I: IntoIterator<Item = String>>(locations: I) -> Arc<Self> {
        Arc::new(Self {
            locations: locations.into_iter().collect(),
            rows: Mutex::new(HashMap::new()),
            append_delay: None,
            fail_appends: false,
        })
    }

    /// Create a store whose appends sleep for the given duration first.
    pub fn with_append_delay<I: IntoIterator<Item = String>>(locations: I, delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            locations: locations.into_iter().collect(),
            rows: Mutex::new(HashMap::new()),
            append_delay: Some(delay),
            fail_appends: false,
        })
    }

    /// Create a store whose appends always fail.
    pub fn with_failing_appends<I: IntoIterator<Item = String>>(locations: I) -> Arc<Self> {
        Arc::new(Self {
            locations: locations.into_iter().collect(),
            rows: Mutex::new(HashMap::new()),
            append_delay: None,
            fail_appends: true,
        })
    }

    /// All rows appended to the given location so far.
    pub fn rows(&self, storage_location: &str) -> Vec<StructuredRow> {
        self.rows.lock().expect("fixture lock poisoned").get(storage_location).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn exists(&self, storage_location: &str) -> Result<bool> {
        Ok(self.locations.contains(storage_location))
    }

    async fn append(&self, storage_location: &str, row: StructuredRow) -> Result<()> {
        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_appends {
            anyhow::bail!("scripted append failure for {}", storage_location);
        }
        self.rows
            .lock()
            .expect("fixture lock poisoned")
            .entry(storage_location.to_string())
            .or_default()
            .push(row);
        Ok(())
    }
}
