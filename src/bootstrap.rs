//! Bootstrap coordinator.
//!
//! The coordinator is the entry point of the crate: it resolves stream
//! configuration, validates the destination index and its storage, discovers
//! the partition's lead broker, recovers a safe resume offset, then launches
//! the intake and build stages of a pipeline and blocks the caller until the
//! build stage finishes or fails. A registry of active pipelines supports
//! stopping everything from a separate task, typically on process
//! termination.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::broker::{self, BrokerClient};
use crate::build::BuildStage;
use crate::config::Config;
use crate::error::{IngestError, IngestResult};
use crate::index::{IndexCatalog, SegmentStore};
use crate::intake::{IntakeStage, RecordHandler, WrapRecordHandler};
use crate::parser::JsonRecordParser;

/// The bootstrap coordinator for streaming ingestion pipelines.
///
/// One instance is expected per process. The embedding application owns the
/// instance and is responsible for invoking [`Bootstrap::stop`] from its own
/// termination handling.
pub struct Bootstrap {
    /// The application's runtime config.
    config: Arc<Config>,
    /// The client used for all broker calls.
    broker: Arc<dyn BrokerClient>,
    /// The catalog resolving destination index instances.
    catalog: Arc<dyn IndexCatalog>,
    /// The storage system backing index segments.
    store: Arc<dyn SegmentStore>,
    /// The handler injected into every intake stage.
    handler: Arc<dyn RecordHandler>,
    /// All active pipelines, keyed by `"{stream}_{partition}"`.
    pipelines: Mutex<HashMap<String, PipelineHandle>>,
}

/// The registered handle of one active pipeline.
struct PipelineHandle {
    /// The pipeline's shutdown channel.
    shutdown_tx: broadcast::Sender<()>,
}

impl Bootstrap {
    /// Create a new instance.
    pub fn new(config: Arc<Config>, broker: Arc<dyn BrokerClient>, catalog: Arc<dyn IndexCatalog>, store: Arc<dyn SegmentStore>) -> Self {
        Self {
            config,
            broker,
            catalog,
            store,
            handler: Arc::new(WrapRecordHandler),
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the record handler injected into intake stages.
    pub fn with_record_handler(mut self, handler: Arc<dyn RecordHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Start an ingestion pipeline for the given stream partition.
    ///
    /// All precondition checks fail fast with no internal retry. On success
    /// this call blocks until the pipeline's build stage finishes or fails,
    /// which under normal operation means until [`Bootstrap::stop`] is
    /// invoked from another task; failures inside either stage surface here
    /// as [`IngestError::StreamProcessing`].
    ///
    /// A second `start` for a key whose pipeline is still running is
    /// rejected with [`IngestError::DuplicatePipeline`]; once the first
    /// pipeline has finished the key may be started again.
    pub async fn start(&self, stream: &str, partition: u32) -> IngestResult<()> {
        let source = self
            .config
            .source(stream)
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| IngestError::ConfigurationMissing(stream.to_string()))?;

        let index = self
            .catalog
            .get_index(&source.index)
            .await
            .map_err(IngestError::StreamProcessing)?
            .ok_or_else(|| IngestError::ResourceMissing(format!("index instance '{}' not found", source.index)))?;
        let segment = index
            .segments
            .first()
            .cloned()
            .ok_or_else(|| IngestError::ResourceMissing(format!("index instance '{}' has no segments", source.index)))?;

        match serde_yaml::to_string(source.as_ref()) {
            Ok(dump) => tracing::info!(stream, partition, "resolved stream source config:\n{}", dump),
            Err(err) => tracing::warn!(error = ?err, "error serializing stream source config for diagnostics"),
        }

        let lead = broker::locate_lead_broker(&self.broker, &source.topic, partition, &source.brokers)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "error querying partition metadata");
                IngestError::BrokerUnavailable { topic: source.topic.clone(), partition }
            })?
            .ok_or_else(|| IngestError::BrokerUnavailable { topic: source.topic.clone(), partition })?;

        let earliest = self
            .broker
            .earliest_offset(&source.topic, partition, &lead)
            .await
            .map_err(IngestError::StreamProcessing)?;
        let persisted = index.stream_offsets.get(&partition).copied().unwrap_or(0);
        let start_offset = recover_offset(persisted, earliest);
        tracing::info!(stream, partition, persisted, earliest, start_offset, "recovered ingestion offset");

        let storage_exists = self
            .store
            .exists(&segment.storage_location)
            .await
            .map_err(IngestError::StreamProcessing)?;
        if !storage_exists {
            return Err(IngestError::StorageNotProvisioned(segment.storage_location));
        }

        // The intake stage subscribes to the shutdown channel at construction
        // time, before the pipeline is registered, so a concurrent `stop()`
        // can never race past an unsubscribed stage.
        let (shutdown_tx, _) = broadcast::channel(1);
        let (intake, records_rx) = IntakeStage::new(
            stream.to_string(),
            source.clone(),
            partition,
            lead,
            start_offset,
            self.broker.clone(),
            self.handler.clone(),
            shutdown_tx.clone(),
        );

        // Register the pipeline before launching its stages, rejecting a key
        // whose previous pipeline is still running.
        let key = pipeline_key(stream, partition);
        {
            let mut pipelines = self.pipelines.lock().await;
            if pipelines.contains_key(&key) {
                return Err(IngestError::DuplicatePipeline(key));
            }
            pipelines.insert(key.clone(), PipelineHandle { shutdown_tx: shutdown_tx.clone() });
        }
        let intake_handle = intake.spawn();

        let parser = Arc::new(JsonRecordParser::new(index.columns.clone()));
        let build = BuildStage::new(segment.storage_location.clone(), partition, parser, self.store.clone(), records_rx);
        let build_handle = build.spawn();

        // Block until the build stage completes. The intake stage owns the
        // sending side of the queue, so the build stage drains and exits once
        // intake stops; a build failure instead leaves intake running, so
        // always signal shutdown before joining it.
        let build_res = build_handle.await;
        let _ = shutdown_tx.send(());
        let intake_res = intake_handle.await;
        self.pipelines.lock().await.remove(&key);

        match build_res {
            Ok(Ok(())) => (),
            Ok(Err(err)) => return Err(IngestError::StreamProcessing(err)),
            Err(err) => return Err(IngestError::StreamProcessing(err.into())),
        }
        match intake_res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(IngestError::StreamProcessing(err)),
            Err(err) => Err(IngestError::StreamProcessing(err.into())),
        }
    }

    /// Signal every registered pipeline to stop.
    ///
    /// Best-effort: failure to signal one pipeline does not prevent stopping
    /// the others, and this call does not wait for build stages to drain.
    /// Calling this with no registered pipelines is a no-op.
    pub async fn stop(&self) {
        let mut pipelines = self.pipelines.lock().await;
        tracing::info!(pipelines = pipelines.len(), "stopping all active ingestion pipelines");
        for (key, handle) in pipelines.drain() {
            if handle.shutdown_tx.send(()).is_err() {
                tracing::warn!(pipeline = %key, "pipeline was already stopped");
            }
        }
    }
}

/// Compute the offset at which ingestion for a partition should resume.
///
/// The persisted offset may point before data the broker has already expired
/// or compacted away; clamping to the earliest still-available offset avoids
/// requesting unreadable data while preserving forward progress when the
/// persisted offset is still valid.
pub fn recover_offset(persisted: u64, earliest: u64) -> u64 {
    persisted.max(earliest)
}

/// The registry key addressing one running pipeline.
pub fn pipeline_key(stream: &str, partition: u32) -> String {
    format!("{}_{}", stream, partition)
}
