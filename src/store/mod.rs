//! Embedding store: namespaced vectors plus metadata under one lock

pub mod config;
pub mod error;
pub mod index;
pub mod metadata;
pub mod store;
pub mod types;

pub use config::{Distance, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use index::{ScoredId, VectorIndex};
pub use metadata::MetadataStore;
pub use store::{EmbeddingStore, StoreSnapshot};
pub use types::{
    Metadata, MetadataValue, Namespace, ReconcileReport, SearchFilter, SearchHit, VectorRecord,
};

#[cfg(test)]
mod tests;
