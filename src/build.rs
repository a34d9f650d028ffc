//! Build stage.
//!
//! The build stage drains the inter-stage queue strictly in the order the
//! intake stage enqueued records, parses each payload into structured fields
//! via the injected parser, and appends the result to the destination index
//! segment. It exits once the queue closes and drains (the intake stage has
//! stopped), or immediately on the first parse or append failure.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::index::SegmentStore;
use crate::intake::StreamRecord;
use crate::parser::RecordParser;

pub(crate) const METRIC_BUILD_ROWS: &str = "sluice_build_rows_appended";

/// The build stage of one ingestion pipeline.
pub struct BuildStage {
    /// The storage location of the destination segment.
    storage_location: String,
    /// The partition this stage builds for.
    partition: u32,

    /// The injected parser bound to the destination index's column schema.
    parser: Arc<dyn RecordParser>,
    /// The storage system to append structured rows to.
    store: Arc<dyn SegmentStore>,
    /// The receiving side of the queue shared with the intake stage.
    records_rx: mpsc::Receiver<StreamRecord>,
}

impl BuildStage {
    /// Create a new instance.
    pub fn new(
        storage_location: String, partition: u32, parser: Arc<dyn RecordParser>, store: Arc<dyn SegmentStore>, records_rx: mpsc::Receiver<StreamRecord>,
    ) -> Self {
        Self { storage_location, partition, parser, store, records_rx }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        tracing::debug!(storage_location = %self.storage_location, partition = self.partition, "build stage has started");
        metrics::register_counter!(METRIC_BUILD_ROWS, metrics::Unit::Count, "number of structured rows appended to segment storage");

        while let Some(record) = self.records_rx.recv().await {
            let offset = record.offset;
            let row = self
                .parser
                .parse(&record)
                .with_context(|| format!("error parsing stream record at offset {}", offset))?;
            self.store
                .append(&self.storage_location, row)
                .await
                .with_context(|| format!("error appending structured row at offset {}", offset))?;
            metrics::counter!(METRIC_BUILD_ROWS, 1);
        }

        tracing::debug!(storage_location = %self.storage_location, partition = self.partition, "build stage has shutdown");
        Ok(())
    }
}
