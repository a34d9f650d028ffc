//! Record parsing.

use anyhow::{Context, Result};

use crate::index::StructuredRow;
use crate::intake::StreamRecord;

/// A parser turning a raw stream record into a structured row.
///
/// Parsers are bound to the destination index's column schema and injected
/// into the build stage, keeping payload interpretation decoupled from the
/// ingestion machinery.
pub trait RecordParser: Send + Sync + 'static {
    /// Parse the given record's payload into a structured row.
    fn parse(&self, record: &StreamRecord) -> Result<StructuredRow>;
}

/// A parser for JSON object payloads.
///
/// Each configured column is projected from the payload's top-level object in
/// schema order; columns absent from the payload yield `null`.
pub struct JsonRecordParser {
    columns: Vec<String>,
}

impl JsonRecordParser {
    /// Create a new instance bound to the given column schema.
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }
}

impl RecordParser for JsonRecordParser {
    fn parse(&self, record: &StreamRecord) -> Result<StructuredRow> {
        let value: serde_json::Value = serde_json::from_slice(&record.payload)
            .with_context(|| format!("error parsing record payload as JSON at offset {}", record.offset))?;
        let object = value
            .as_object()
            .with_context(|| format!("record payload at offset {} is not a JSON object", record.offset))?;
        let fields = self
            .columns
            .iter()
            .map(|column| object.get(column).cloned().unwrap_or(serde_json::Value::Null))
            .collect();
        Ok(StructuredRow { offset: record.offset, fields })
    }
}
