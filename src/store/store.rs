//! The authoritative embedding store
//!
//! Single read/write path for vectors and metadata across the content and
//! user namespaces. Both internal stores (metadata map and similarity
//! index) sit behind one `RwLock`, so every operation observes either all
//! or none of an upsert, and a snapshot is a consistent point-in-time view
//! acquired within one read-lock window.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::metrics::StoreMetrics;

use super::config::StoreConfig;
use super::error::{StoreError, StoreResult};
use super::index::VectorIndex;
use super::metadata::MetadataStore;
use super::types::{
    Metadata, Namespace, ReconcileReport, SearchFilter, SearchHit, VectorRecord,
};

struct StoreInner {
    metadata: MetadataStore,
    indices: BTreeMap<Namespace, VectorIndex>,
}

impl StoreInner {
    fn empty(dimension: usize) -> Self {
        Self {
            metadata: MetadataStore::new(),
            indices: Namespace::ALL
                .iter()
                .map(|&ns| (ns, VectorIndex::new(dimension)))
                .collect(),
        }
    }

    fn index(&self, namespace: Namespace) -> &VectorIndex {
        // Every namespace is seeded in `empty`, so the entry always exists.
        &self.indices[&namespace]
    }

    fn index_mut(&mut self, namespace: Namespace) -> &mut VectorIndex {
        self.indices.get_mut(&namespace).expect("namespace seeded at construction")
    }
}

/// A consistent point-in-time copy of the whole store
///
/// Produced under the read lock by [`EmbeddingStore::snapshot`] and
/// consumed by the backup manager; [`EmbeddingStore::swap`] installs one
/// atomically during restore.
#[derive(Clone)]
pub struct StoreSnapshot {
    pub metadata: MetadataStore,
    pub indices: BTreeMap<Namespace, VectorIndex>,
}

impl StoreSnapshot {
    /// Check the cross-store invariant: every id in the metadata store has
    /// exactly one index entry and vice versa
    pub fn check_consistency(&self) -> StoreResult<()> {
        for &ns in &Namespace::ALL {
            let index = self.indices.get(&ns).ok_or_else(|| StoreError::Consistency {
                namespace: ns.label().to_string(),
                reason: "missing index".to_string(),
            })?;
            let meta_count = self.metadata.count_in(ns);
            if meta_count != index.len() {
                return Err(StoreError::Consistency {
                    namespace: ns.label().to_string(),
                    reason: format!(
                        "metadata store has {} keys but index has {} entries",
                        meta_count,
                        index.len()
                    ),
                });
            }
            for id in self.metadata.ids_in(ns) {
                if !index.contains(&id) {
                    return Err(StoreError::Consistency {
                        namespace: ns.label().to_string(),
                        reason: format!("id '{id}' present in metadata store but not in index"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Namespaced vector + metadata store
pub struct EmbeddingStore {
    config: StoreConfig,
    inner: RwLock<StoreInner>,
    metrics: Arc<StoreMetrics>,
}

impl EmbeddingStore {
    pub fn new(config: StoreConfig, metrics: Arc<StoreMetrics>) -> Self {
        info!(
            dimension = config.dimension,
            distance = ?config.distance,
            "initializing embedding store"
        );
        Self {
            inner: RwLock::new(StoreInner::empty(config.dimension)),
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Insert or update a record
    ///
    /// The index is written first (in-memory, revertible), then the
    /// metadata commit makes the record live; a metadata failure rolls the
    /// index back. Both halves happen under the write lock, so readers
    /// never observe a half-applied upsert.
    pub async fn upsert(
        &self,
        namespace: Namespace,
        id: &str,
        embedding: Vec<f32>,
        metadata: Metadata,
    ) -> StoreResult<()> {
        if embedding.len() != self.config.dimension {
            return Err(StoreError::InvalidDimension {
                expected: self.config.dimension,
                actual: embedding.len(),
            });
        }

        let mut inner = self.inner.write().await;

        let index = inner.index_mut(namespace);
        let existed = index.contains(id);
        let previous = index.get(id).map(<[f32]>::to_vec);
        index.insert(id, embedding.clone())?;

        let inserted_at = inner
            .metadata
            .get(namespace, id)
            .map(|r| r.inserted_at)
            .unwrap_or_else(Utc::now);
        let record = VectorRecord {
            id: id.to_string(),
            embedding,
            metadata,
            inserted_at,
        };

        if let Err(err) = inner.metadata.insert(namespace, record) {
            // Roll back the index half so the invariant holds.
            let index = inner.index_mut(namespace);
            match previous {
                Some(prev) if existed => {
                    let _ = index.insert(id, prev);
                }
                _ => {
                    index.remove(id);
                }
            }
            return Err(err);
        }

        let count = inner.index(namespace).len() as u64;
        drop(inner);
        self.metrics.set_vector_count(namespace, count);
        debug!(namespace = %namespace, id, "upserted record");
        Ok(())
    }

    /// Remove a record from both stores; deleting an absent id is a no-op
    pub async fn delete(&self, namespace: Namespace, id: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let removed_meta = inner.metadata.remove(namespace, id).is_some();
        let removed_index = inner.index_mut(namespace).remove(id).is_some();

        let count = inner.index(namespace).len() as u64;
        drop(inner);
        self.metrics.set_vector_count(namespace, count);

        let removed = removed_meta || removed_index;
        if removed {
            debug!(namespace = %namespace, id, "deleted record");
        }
        Ok(removed)
    }

    /// Fetch a record, or `None` if the id is unknown
    pub async fn get(&self, namespace: Namespace, id: &str) -> Option<VectorRecord> {
        let inner = self.inner.read().await;
        inner.metadata.get(namespace, id).cloned()
    }

    /// k nearest records by the deployment's distance metric
    ///
    /// Results reflect one consistent snapshot of the index no older than
    /// the start of the call. Ties resolve to the first-inserted record;
    /// `k` larger than the record count returns everything, sorted.
    pub async fn similarity_search(
        &self,
        namespace: Namespace,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> StoreResult<Vec<SearchHit>> {
        let inner = self.inner.read().await;

        let scored = inner.index(namespace).search(
            query,
            k,
            self.config.distance,
            |id| match filter {
                Some(filter) if !filter.is_empty() => inner
                    .metadata
                    .get(namespace, id)
                    .map(|record| filter.matches(&record.metadata))
                    .unwrap_or(false),
                _ => true,
            },
        )?;

        Ok(scored
            .into_iter()
            .map(|hit| {
                let metadata = inner
                    .metadata
                    .get(namespace, &hit.id)
                    .map(|record| record.metadata.clone())
                    .unwrap_or_default();
                SearchHit {
                    id: hit.id,
                    score: hit.score,
                    metadata,
                }
            })
            .collect())
    }

    /// Invariant-checked record count
    ///
    /// Fails with a consistency error if the metadata store and the index
    /// disagree; `reconcile` is the repair path.
    pub async fn count(&self, namespace: Namespace) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        let meta_count = inner.metadata.count_in(namespace);
        let index_count = inner.index(namespace).len();
        if meta_count != index_count {
            return Err(StoreError::Consistency {
                namespace: namespace.label().to_string(),
                reason: format!(
                    "metadata store has {meta_count} keys but index has {index_count} entries"
                ),
            });
        }
        Ok(index_count as u64)
    }

    /// Remove orphaned ids present in only one of the two stores
    ///
    /// Repairs only by deletion, never by fabricating missing data.
    pub async fn reconcile(&self, namespace: Namespace) -> StoreResult<ReconcileReport> {
        let mut inner = self.inner.write().await;
        let mut report = ReconcileReport::default();

        let index_ids: Vec<String> =
            inner.index(namespace).ids().map(str::to_string).collect();
        for id in index_ids {
            if !inner.metadata.contains(namespace, &id) {
                inner.index_mut(namespace).remove(&id);
                report.removed_from_index.push(id);
            }
        }

        for id in inner.metadata.ids_in(namespace) {
            if !inner.index(namespace).contains(&id) {
                inner.metadata.remove(namespace, &id);
                report.removed_from_metadata.push(id);
            }
        }

        let count = inner.index(namespace).len() as u64;
        drop(inner);
        self.metrics.set_vector_count(namespace, count);

        if !report.is_clean() {
            warn!(
                namespace = %namespace,
                removed_from_index = report.removed_from_index.len(),
                removed_from_metadata = report.removed_from_metadata.len(),
                "reconcile removed orphaned entries"
            );
        }
        Ok(report)
    }

    /// Point-in-time snapshot of both stores across all namespaces
    ///
    /// Holds the read lock only for the duration of the clone; concurrent
    /// upserts after this window are not part of the snapshot.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().await;
        StoreSnapshot {
            metadata: inner.metadata.clone(),
            indices: inner.indices.clone(),
        }
    }

    /// Drop a record from only the metadata store, leaving the index entry
    /// orphaned. Exists to exercise the reconcile and count paths.
    #[cfg(test)]
    pub(crate) async fn remove_metadata_only(&self, namespace: Namespace, id: &str) {
        let mut inner = self.inner.write().await;
        inner.metadata.remove(namespace, id);
    }

    /// Drop a record from only the index, leaving the metadata orphaned
    #[cfg(test)]
    pub(crate) async fn remove_index_only(&self, namespace: Namespace, id: &str) {
        let mut inner = self.inner.write().await;
        inner.index_mut(namespace).remove(id);
    }

    /// Atomically replace the live state with a restored snapshot
    ///
    /// The snapshot is validated (dimension and cross-store consistency)
    /// before the swap; on any error the previous live state is untouched.
    pub async fn swap(&self, snapshot: StoreSnapshot) -> StoreResult<()> {
        for (&ns, index) in &snapshot.indices {
            if index.dimension() != self.config.dimension {
                return Err(StoreError::InvalidDimension {
                    expected: self.config.dimension,
                    actual: index.dimension(),
                });
            }
            debug!(namespace = %ns, records = index.len(), "validated restored index");
        }
        snapshot.check_consistency()?;

        let mut inner = self.inner.write().await;
        inner.metadata = snapshot.metadata;
        inner.indices = snapshot.indices;

        for &ns in &Namespace::ALL {
            let count = inner.index(ns).len() as u64;
            self.metrics.set_vector_count(ns, count);
        }
        info!("live store state swapped to restored snapshot");
        Ok(())
    }
}
