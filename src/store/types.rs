//! Record and namespace types for the embedding store

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical partition of the store
///
/// Content and user vectors live in separate key prefixes and separate
/// indices so their ids can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Content,
    User,
}

impl Namespace {
    /// All namespaces, in a fixed iteration order
    pub const ALL: [Namespace; 2] = [Namespace::Content, Namespace::User];

    /// Key prefix in the metadata store
    pub fn key_prefix(self) -> &'static str {
        match self {
            Namespace::Content => "chimera-vectors:",
            Namespace::User => "chimera-users:",
        }
    }

    /// Backup artifact file name for this namespace's index
    pub fn artifact_name(self) -> &'static str {
        match self {
            Namespace::Content => "content_index.bin",
            Namespace::User => "user_index.bin",
        }
    }

    /// Short label for metrics and manifests
    pub fn label(self) -> &'static str {
        match self {
            Namespace::Content => "content",
            Namespace::User => "user",
        }
    }

    /// Full metadata store key for an id in this namespace
    pub fn key_for(self, id: &str) -> String {
        format!("{}{}", self.key_prefix(), id)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Closed set of metadata scalar types
///
/// Restore compatibility is easier to reason about with a fixed value
/// vocabulary than with free-form JSON documents; the manifest's
/// `schema_version` covers this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Num(f64),
    // Tried before Str so RFC 3339 strings round-trip as timestamps
    Timestamp(DateTime<Utc>),
    Str(String),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Str(s)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Num(n)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(ts: DateTime<Utc>) -> Self {
        MetadataValue::Timestamp(ts)
    }
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Ordered metadata mapping attached to each record
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A stored vector with its metadata
///
/// Owned exclusively by the embedding store; immutable once stored except
/// through explicit upsert calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique id within its namespace
    pub id: String,
    /// Fixed-length embedding (dimension set per deployment)
    pub embedding: Vec<f32>,
    /// Scalar metadata (tags, type, timestamps, content reference)
    pub metadata: Metadata,
    /// When the record was first inserted
    pub inserted_at: DateTime<Utc>,
}

/// One result of a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    /// Similarity score under the deployment's distance metric
    pub score: f32,
    pub metadata: Metadata,
}

/// Exact-match predicate over metadata fields
///
/// All listed fields must be present and equal for a record to match.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    fields: Metadata,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.fields
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

/// Result of a reconcile pass over one namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Ids that were present only in the index and got removed from it
    pub removed_from_index: Vec<String>,
    /// Ids that were present only in the metadata store and got removed
    pub removed_from_metadata: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.removed_from_index.is_empty() && self.removed_from_metadata.is_empty()
    }
}
