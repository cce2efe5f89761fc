//! Embedding store configuration

use serde::{Deserialize, Serialize};

/// Distance metric for vector similarity
///
/// Chosen once per deployment and never mixed; a backup taken under one
/// metric restores under the same metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Distance {
    /// Cosine similarity (normalized dot product)
    Cosine,
    /// Euclidean distance (L2), reported as 1 / (1 + distance)
    Euclidean,
}

impl Default for Distance {
    fn default() -> Self {
        Distance::Cosine
    }
}

/// Main configuration for the embedding store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Vector dimension (must match the upstream embedding model output)
    pub dimension: usize,

    /// Distance metric for similarity
    pub distance: Distance,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dimension: 384, // all-MiniLM-L6-v2 output dimension
            distance: Distance::default(),
        }
    }
}

impl StoreConfig {
    /// Create a new config with a custom vector dimension
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Create a new config with a custom distance metric
    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }
}
