//! Intake stage.
//!
//! One intake stage exists per registered pipeline. It reads sequential
//! messages from the lead broker beginning at the recovered offset and
//! publishes them, in offset order, onto the bounded queue shared with the
//! build stage. Enqueueing blocks when the queue is full (backpressure);
//! both the broker poll and the enqueue race the shutdown signal so that
//! `stop()` never deadlocks against a full queue.

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::stream::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use crate::broker::{BrokerClient, BrokerEndpoint};
use crate::config::StreamSource;

/// The delay applied before polling the broker again after an empty fetch.
const FETCH_IDLE_INTERVAL: std::time::Duration = std::time::Duration::from_millis(250);

pub(crate) const METRIC_INTAKE_RECORDS: &str = "sluice_intake_records_enqueued";

/// The in-flight unit of work passed from the intake stage to the build stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRecord {
    /// The record's offset within its partition.
    pub offset: u64,
    /// The raw record payload.
    pub payload: Bytes,
}

/// A handler turning a raw broker message into a stream record.
///
/// This parameterizes the intake read loop, decoupling record construction
/// from the loop itself.
pub trait RecordHandler: Send + Sync + 'static {
    /// Build the stream record for a received broker message.
    fn on_record(&self, offset: u64, payload: Bytes) -> Result<StreamRecord>;
}

/// The default handler, wrapping the payload unmodified.
pub struct WrapRecordHandler;

impl RecordHandler for WrapRecordHandler {
    fn on_record(&self, offset: u64, payload: Bytes) -> Result<StreamRecord> {
        Ok(StreamRecord { offset, payload })
    }
}

/// The intake stage of one ingestion pipeline.
pub struct IntakeStage {
    /// The name of the stream being ingested.
    stream: String,
    /// The source configuration of the stream.
    source: Arc<StreamSource>,
    /// The partition this stage reads from.
    partition: u32,
    /// The broker currently leading the partition, resolved at startup.
    lead: BrokerEndpoint,
    /// The next offset to fetch from the broker.
    next_offset: u64,

    /// The client used for all broker calls.
    broker: Arc<dyn BrokerClient>,
    /// The injected handler turning broker messages into stream records.
    handler: Arc<dyn RecordHandler>,
    /// The sending side of the queue shared with the build stage.
    records_tx: mpsc::Sender<StreamRecord>,
    /// A channel used for triggering shutdown.
    shutdown_rx: BroadcastStream<()>,
}

impl IntakeStage {
    /// Create a new instance along with the receiving side of its queue.
    pub fn new(
        stream: String, source: Arc<StreamSource>, partition: u32, lead: BrokerEndpoint, start_offset: u64, broker: Arc<dyn BrokerClient>,
        handler: Arc<dyn RecordHandler>, shutdown: broadcast::Sender<()>,
    ) -> (Self, mpsc::Receiver<StreamRecord>) {
        let (records_tx, records_rx) = mpsc::channel(source.queue_capacity);
        (
            Self {
                stream,
                source,
                partition,
                lead,
                next_offset: start_offset,
                broker,
                handler,
                records_tx,
                shutdown_rx: BroadcastStream::new(shutdown.subscribe()),
            },
            records_rx,
        )
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        tracing::debug!(
            topic = %self.source.topic,
            lead = %self.lead,
            offset = self.next_offset,
            "intake stage {}/{} has started",
            self.stream,
            self.partition,
        );
        metrics::register_counter!(METRIC_INTAKE_RECORDS, metrics::Unit::Count, "number of records read from the broker and enqueued");

        loop {
            tokio::select! {
                batch_res = self.broker.fetch(&self.source.topic, self.partition, self.next_offset, self.source.fetch_max_bytes, &self.lead) => {
                    let batch = batch_res.context("error fetching records from lead broker")?;
                    if batch.is_empty() {
                        tokio::select! {
                            _ = tokio::time::sleep(FETCH_IDLE_INTERVAL) => continue,
                            _ = self.shutdown_rx.next() => break,
                        }
                    }
                    if self.forward_batch(batch).await? {
                        break;
                    }
                }
                _ = self.shutdown_rx.next() => break,
            }
        }

        tracing::debug!(offset = self.next_offset, "intake stage {}/{} has shutdown", self.stream, self.partition);
        Ok(())
    }

    /// Forward a fetched batch onto the inter-stage queue in offset order.
    ///
    /// Returns `true` if a shutdown signal was observed while enqueueing.
    async fn forward_batch(&mut self, batch: Vec<(u64, Bytes)>) -> Result<bool> {
        for (offset, payload) in batch {
            let record = self.handler.on_record(offset, payload).context("error building stream record")?;
            tokio::select! {
                send_res = self.records_tx.send(record) => {
                    send_res.context("inter-stage queue closed while intake stage still running")?;
                }
                _ = self.shutdown_rx.next() => return Ok(true),
            }
            self.next_offset = offset + 1;
            metrics::counter!(METRIC_INTAKE_RECORDS, 1);
        }
        Ok(false)
    }
}
