//! Enrichment ingest pipeline
//!
//! Consumes enriched-content events from the broker, upserts each
//! embedding into the content namespace, and publishes a vectorized
//! notice for downstream services. A bounded channel sits between the
//! subscription callback and the store's write path: when the store
//! falls behind, the subscription loop blocks on the channel instead of
//! buffering unboundedly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::error::{ErrorRecovery, RecoveryAction};
use crate::messaging::{MessagingClient, SubscribeOptions};
use crate::metrics::StoreMetrics;
use crate::store::{EmbeddingStore, Metadata, MetadataValue, Namespace, StoreError};

/// Subject pattern carrying enriched content ready for vectorization
pub const SUBJECT_ENRICHED: &str = "nlp.enriched.*";

/// Queue group so multiple instances load-balance the enriched stream
pub const QUEUE_GROUP: &str = "personalization-engine-processors";

/// Default depth of the ingest queue between subscription and store
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Completion subject for a vectorized piece of content
pub fn vectorized_subject(content_type: &str) -> String {
    format!("content.vectorized.{content_type}")
}

fn default_event_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// An enriched-content event as published by the upstream NLP stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentEvent {
    /// Content id; events without one get a generated time-ordered id
    #[serde(default = "default_event_id")]
    pub id: String,
    pub content_type: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub embedding: Vec<f32>,
}

impl EnrichmentEvent {
    /// Metadata stored alongside the embedding
    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(
            "content_type".to_string(),
            MetadataValue::from(self.content_type.as_str()),
        );
        if let Some(source) = &self.source {
            metadata.insert("source".to_string(), MetadataValue::from(source.as_str()));
        }
        if let Some(title) = &self.title {
            metadata.insert("title".to_string(), MetadataValue::from(title.as_str()));
        }
        if let Some(ts) = self.timestamp {
            metadata.insert("timestamp".to_string(), MetadataValue::from(ts));
        }
        metadata
    }
}

/// Published on `content.vectorized.{content_type}` after a successful
/// upsert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizedNotice {
    pub id: String,
    pub content_type: String,
    pub vectorized_at: DateTime<Utc>,
}

/// Handle to a running ingest pipeline
pub struct IngestHandle {
    worker: JoinHandle<()>,
}

impl IngestHandle {
    /// Stop the worker; queued events are dropped
    pub fn shutdown(self) {
        self.worker.abort();
    }
}

pub struct IngestPipeline {
    store: Arc<EmbeddingStore>,
    metrics: Arc<StoreMetrics>,
    queue_capacity: usize,
}

impl IngestPipeline {
    pub fn new(store: Arc<EmbeddingStore>, metrics: Arc<StoreMetrics>) -> Self {
        Self {
            store,
            metrics,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Subscribe to the enriched stream and start the ingest worker
    pub async fn start(
        &self,
        client: Arc<MessagingClient>,
    ) -> crate::messaging::MessagingResult<IngestHandle> {
        let (tx, rx) = mpsc::channel::<EnrichmentEvent>(self.queue_capacity);

        client
            .subscribe(
                SubscribeOptions::new(SUBJECT_ENRICHED).with_queue_group(QUEUE_GROUP),
                move |subject, payload| {
                    let tx = tx.clone();
                    async move {
                        let event: EnrichmentEvent = match serde_json::from_slice(&payload) {
                            Ok(event) => event,
                            Err(err) => {
                                warn!(subject = %subject, error = %err, "undecodable enrichment event dropped");
                                return;
                            }
                        };
                        // Blocks when the queue is full; backpressure
                        // propagates to the subscription loop.
                        if tx.send(event).await.is_err() {
                            warn!(subject = %subject, "ingest worker gone, event dropped");
                        }
                    }
                },
            )
            .await?;

        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&self.store),
            Arc::clone(&self.metrics),
            client,
        ));
        info!(
            subject = SUBJECT_ENRICHED,
            queue_group = QUEUE_GROUP,
            capacity = self.queue_capacity,
            "ingest pipeline started"
        );
        Ok(IngestHandle { worker })
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<EnrichmentEvent>,
    store: Arc<EmbeddingStore>,
    metrics: Arc<StoreMetrics>,
    client: Arc<MessagingClient>,
) {
    while let Some(event) = rx.recv().await {
        match ingest_event(&store, &event).await {
            Ok(notice) => {
                let subject = vectorized_subject(&notice.content_type);
                if let Err(err) = client.publish(&subject, &notice).await {
                    // The upsert stands either way; downstream catches up
                    // from the next notice.
                    warn!(subject = %subject, error = %err, "vectorized notice not published");
                }
            }
            Err(err) => {
                metrics.record_operation_error();
                match err.recovery_action() {
                    RecoveryAction::Skip => {
                        warn!(content_id = %event.id, error = %err, "enrichment event skipped");
                    }
                    _ => {
                        warn!(content_id = %event.id, error = %err, "ingest failed");
                    }
                }
            }
        }
    }
    debug!("ingest worker stopped");
}

/// Upsert one enrichment event into the content namespace
pub async fn ingest_event(
    store: &EmbeddingStore,
    event: &EnrichmentEvent,
) -> Result<VectorizedNotice, StoreError> {
    store
        .upsert(
            Namespace::Content,
            &event.id,
            event.embedding.clone(),
            event.metadata(),
        )
        .await?;
    debug!(content_id = %event.id, content_type = %event.content_type, "content vectorized");
    Ok(VectorizedNotice {
        id: event.id.clone(),
        content_type: event.content_type.clone(),
        vectorized_at: Utc::now(),
    })
}
