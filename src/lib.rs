//! Chimera embedding store
//!
//! A resilient vector + metadata store with point-in-time backup,
//! verified restore, tiered retention, and a circuit-breaker-protected
//! NATS messaging client feeding it enrichment events.

pub mod backup;
pub mod breaker;
pub mod core;
pub mod ingest;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod store;

pub use backup::{BackupError, BackupManager, RetentionPolicy, VerificationReport};
pub use breaker::{BreakerConfig, BreakerError, BreakerState, CircuitBreaker};
pub use crate::core::config::AppConfig;
pub use crate::core::error::{ChimeraError, ErrorRecovery, RecoveryAction, Result};
pub use ingest::{EnrichmentEvent, IngestPipeline};
pub use messaging::{MessagingClient, MessagingConfig, MessagingError, SubscribeOptions};
pub use metrics::StoreMetrics;
pub use store::{EmbeddingStore, Namespace, SearchFilter, StoreConfig, StoreError, VectorRecord};
