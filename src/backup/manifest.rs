//! Backup manifest
//!
//! The manifest is the sole source of truth for verification and restore.
//! It is written last, via temp file + atomic rename, so a backup
//! directory without a readable manifest is by definition a failed
//! attempt and invisible to restore, listing, and cleanup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{BackupError, BackupResult};

/// Manifest schema version; bump on any incompatible layout change
pub const SCHEMA_VERSION: u32 = 1;

/// Manifest file name inside a backup directory
pub const MANIFEST_NAME: &str = "manifest.json";

/// Metadata dump artifact name
pub const METADATA_ARTIFACT: &str = "metadata.json";

/// Timestamp layout for generated backup ids; lexical order equals
/// chronological order
pub const BACKUP_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Immutable description of one finalized backup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupManifest {
    pub backup_id: String,
    pub created_at: DateTime<Utc>,
    /// Record count per namespace label
    pub index_sizes: BTreeMap<String, u64>,
    /// sha256 hex digest per artifact file name
    pub checksums: BTreeMap<String, String>,
    /// Total key count in the metadata dump across all namespaces
    pub source_key_count: u64,
    pub schema_version: u32,
}

impl BackupManifest {
    /// Path of the manifest inside `backup_dir`
    pub fn path_in(backup_dir: &Path) -> PathBuf {
        backup_dir.join(MANIFEST_NAME)
    }

    /// Write the manifest atomically: temp file in the same directory,
    /// then rename over the final name
    pub async fn write_to(&self, backup_dir: &Path) -> BackupResult<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| BackupError::Serialization {
            reason: e.to_string(),
        })?;

        let tmp = backup_dir.join(format!(".{MANIFEST_NAME}.tmp"));
        let path = Self::path_in(backup_dir);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Load a manifest, rejecting unreadable or wrong-schema files
    pub async fn load_from(backup_dir: &Path, backup_id: &str) -> BackupResult<Self> {
        let path = Self::path_in(backup_dir);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::NotFound {
                    backup_id: backup_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_bytes(&bytes, backup_id)
    }

    pub fn from_bytes(bytes: &[u8], backup_id: &str) -> BackupResult<Self> {
        let manifest: BackupManifest =
            serde_json::from_slice(bytes).map_err(|e| BackupError::ManifestUnreadable {
                backup_id: backup_id.to_string(),
                reason: e.to_string(),
            })?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(BackupError::SchemaVersion {
                found: manifest.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(manifest)
    }

    pub fn to_bytes(&self) -> BackupResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| BackupError::Serialization {
            reason: e.to_string(),
        })
    }
}

/// Generate a timestamp-derived backup id
pub fn generate_backup_id(now: DateTime<Utc>) -> String {
    now.format(BACKUP_ID_FORMAT).to_string()
}

/// Parse the creation time encoded in a backup id
///
/// Retention classification works off the id so it never needs to read
/// every manifest; ids that don't follow the timestamp layout are not
/// classified and therefore never deleted by cleanup.
pub fn parse_backup_id(backup_id: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(backup_id, BACKUP_ID_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Reject ids that could escape the backup directory or break key layout
pub fn validate_backup_id(backup_id: &str) -> BackupResult<()> {
    if backup_id.is_empty() {
        return Err(BackupError::InvalidBackupId {
            backup_id: backup_id.to_string(),
            reason: "id must not be empty".to_string(),
        });
    }
    let ok = backup_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !ok {
        return Err(BackupError::InvalidBackupId {
            backup_id: backup_id.to_string(),
            reason: "only alphanumerics, '-' and '_' are allowed".to_string(),
        });
    }
    Ok(())
}

/// sha256 hex digest of an artifact's bytes
pub fn artifact_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
