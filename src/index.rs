//! Index catalog & segment storage collaborator interfaces.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

/// A unit of destination storage holding built structured data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexSegment {
    /// The segment name.
    pub name: String,
    /// The storage location identifier under which the segment's data lives.
    pub storage_location: String,
}

/// A destination index instance resolved by name from the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexInstance {
    /// The index name.
    pub name: String,
    /// The ordered column schema of the index.
    pub columns: Vec<String>,
    /// The ordered list of segments belonging to this index.
    pub segments: Vec<IndexSegment>,
    /// The last durably recorded ingestion offset per partition.
    pub stream_offsets: HashMap<u32, u64>,
}

/// A structured row built from one raw stream record.
///
/// Field values are aligned positionally with the index column schema.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredRow {
    /// The partition offset of the source record.
    pub offset: u64,
    /// The parsed field values, one per index column.
    pub fields: Vec<serde_json::Value>,
}

/// The catalog which resolves index instances by name.
#[async_trait]
pub trait IndexCatalog: Send + Sync + 'static {
    /// Resolve the index instance of the given name, if it exists.
    async fn get_index(&self, name: &str) -> Result<Option<IndexInstance>>;
}

/// The storage system backing index segments.
///
/// Writes are single-writer per partition; the core never contends on the
/// same segment from multiple pipelines.
#[async_trait]
pub trait SegmentStore: Send + Sync + 'static {
    /// Check whether the given storage location physically exists.
    async fn exists(&self, storage_location: &str) -> Result<bool>;

    /// Append one structured row to the given storage location.
    async fn append(&self, storage_location: &str, row: StructuredRow) -> Result<()>;
}
