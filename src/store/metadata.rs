//! In-process metadata store
//!
//! Prefix-keyed key/value map holding the full [`VectorRecord`] for every
//! id, mirroring the durable KV layout (`chimera-vectors:<id>`,
//! `chimera-users:<id>`). Cloning produces the point-in-time snapshot the
//! backup manager serializes.

use std::collections::BTreeMap;

use super::error::{StoreError, StoreResult};
use super::types::{Namespace, VectorRecord};

#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    entries: BTreeMap<String, VectorRecord>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `id` in `namespace`
    pub fn insert(&mut self, namespace: Namespace, record: VectorRecord) -> StoreResult<()> {
        if record.id.is_empty() {
            return Err(StoreError::InvalidId {
                reason: "id must not be empty".to_string(),
            });
        }
        // ':' delimits the namespace prefix in key space.
        if record.id.contains(':') {
            return Err(StoreError::InvalidId {
                reason: format!("id '{}' must not contain ':'", record.id),
            });
        }
        self.entries.insert(namespace.key_for(&record.id), record);
        Ok(())
    }

    pub fn remove(&mut self, namespace: Namespace, id: &str) -> Option<VectorRecord> {
        self.entries.remove(&namespace.key_for(id))
    }

    pub fn get(&self, namespace: Namespace, id: &str) -> Option<&VectorRecord> {
        self.entries.get(&namespace.key_for(id))
    }

    pub fn contains(&self, namespace: Namespace, id: &str) -> bool {
        self.entries.contains_key(&namespace.key_for(id))
    }

    /// Ids stored under a namespace's prefix
    pub fn ids_in(&self, namespace: Namespace) -> Vec<String> {
        let prefix = namespace.key_prefix();
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key[prefix.len()..].to_string())
            .collect()
    }

    /// Records stored under a namespace's prefix, in key order
    pub fn records_in(&self, namespace: Namespace) -> impl Iterator<Item = &VectorRecord> {
        let prefix = namespace.key_prefix();
        self.entries
            .range(prefix.to_string()..)
            .take_while(move |(key, _)| key.starts_with(prefix))
            .map(|(_, record)| record)
    }

    pub fn count_in(&self, namespace: Namespace) -> usize {
        let prefix = namespace.key_prefix();
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .count()
    }

    /// Total key count across all namespaces (manifest `source_key_count`)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full key→record view, used by the backup dump
    pub fn entries(&self) -> &BTreeMap<String, VectorRecord> {
        &self.entries
    }

    /// Rebuild from a backup dump
    pub fn from_entries(entries: BTreeMap<String, VectorRecord>) -> Self {
        Self { entries }
    }
}
