//! In-memory similarity index
//!
//! Exact nearest-neighbor search over one namespace's vectors. Slots are
//! dense (removal swap-fills from the tail) and every slot remembers its
//! insertion sequence number so equal scores resolve deterministically to
//! the first-inserted record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::config::Distance;
use super::error::{StoreError, StoreResult};

/// A scored candidate returned by the index
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    dimension: usize,
    /// slot → id
    ids: Vec<String>,
    /// slot → embedding
    embeddings: Vec<Vec<f32>>,
    /// slot → insertion sequence (tie-break, survives updates)
    seq: Vec<u64>,
    /// id → slot
    slots: HashMap<String, usize>,
    next_seq: u64,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            embeddings: Vec::new(),
            seq: Vec::new(),
            slots: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.slots.get(id).map(|&slot| self.embeddings[slot].as_slice())
    }

    /// Insert or replace `id`'s embedding
    ///
    /// Replacing keeps the original insertion sequence, so a record
    /// updated in place still wins ties as the first-inserted one.
    pub fn insert(&mut self, id: &str, embedding: Vec<f32>) -> StoreResult<()> {
        if embedding.len() != self.dimension {
            return Err(StoreError::InvalidDimension {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        if let Some(&slot) = self.slots.get(id) {
            self.embeddings[slot] = embedding;
            return Ok(());
        }

        let slot = self.ids.len();
        self.ids.push(id.to_string());
        self.embeddings.push(embedding);
        self.seq.push(self.next_seq);
        self.next_seq += 1;
        self.slots.insert(id.to_string(), slot);
        Ok(())
    }

    /// Remove `id`; returns the removed embedding if it was present
    pub fn remove(&mut self, id: &str) -> Option<Vec<f32>> {
        let slot = self.slots.remove(id)?;
        let last = self.ids.len() - 1;

        self.ids.swap(slot, last);
        self.embeddings.swap(slot, last);
        self.seq.swap(slot, last);

        self.ids.pop();
        let removed = self.embeddings.pop();
        self.seq.pop();

        // The former tail vector now lives in the vacated slot.
        if slot < self.ids.len() {
            self.slots.insert(self.ids[slot].clone(), slot);
        }

        removed
    }

    /// Exact k-NN over records accepted by `pred`
    ///
    /// Scores all candidates, sorts by score descending with ties broken
    /// by insertion order (first-inserted wins). A `k` larger than the
    /// candidate count returns everything, sorted.
    pub fn search<F>(
        &self,
        query: &[f32],
        k: usize,
        distance: Distance,
        mut pred: F,
    ) -> StoreResult<Vec<ScoredId>>
    where
        F: FnMut(&str) -> bool,
    {
        if query.len() != self.dimension {
            return Err(StoreError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = (0..self.ids.len())
            .filter(|&slot| pred(&self.ids[slot]))
            .map(|slot| (slot, similarity(query, &self.embeddings[slot], distance)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.seq[a.0].cmp(&self.seq[b.0]))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(slot, score)| ScoredId {
                id: self.ids[slot].clone(),
                score,
            })
            .collect())
    }

    /// Serialize to the backup artifact format
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Deserialize a backup artifact, rejecting structurally broken data
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let index: VectorIndex =
            bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
                reason: e.to_string(),
            })?;

        if index.ids.len() != index.embeddings.len()
            || index.ids.len() != index.seq.len()
            || index.ids.len() != index.slots.len()
        {
            return Err(StoreError::Serialization {
                reason: "index artifact has inconsistent slot tables".to_string(),
            });
        }
        for (id, &slot) in &index.slots {
            if index.ids.get(slot).map(String::as_str) != Some(id.as_str()) {
                return Err(StoreError::Serialization {
                    reason: format!("index artifact slot map broken for id '{id}'"),
                });
            }
        }
        if index.embeddings.iter().any(|e| e.len() != index.dimension) {
            return Err(StoreError::Serialization {
                reason: "index artifact contains wrong-dimension embedding".to_string(),
            });
        }

        Ok(index)
    }
}

/// Similarity under the configured metric, higher is closer
fn similarity(a: &[f32], b: &[f32], distance: Distance) -> f32 {
    match distance {
        Distance::Cosine => cosine_similarity(a, b),
        Distance::Euclidean => euclidean_similarity(a, b),
    }
}

/// Cosine similarity between two vectors, in [-1, 1]
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Euclidean similarity as 1 / (1 + distance), in (0, 1]
fn euclidean_similarity(a: &[f32], b: &[f32]) -> f32 {
    let distance: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt();

    1.0 / (1.0 + distance)
}
