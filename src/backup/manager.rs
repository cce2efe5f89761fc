//! Backup manager
//!
//! Point-in-time backup, verified restore, and tiered cleanup for the
//! embedding store. A backup attempt walks Pending → MetadataSnapshotted
//! → IndicesSerialized → Uploaded → Finalized; failing at any step
//! removes the partial local artifacts, so only finalized backups (those
//! with a readable manifest) are ever visible to restore and cleanup.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::core::config::BackupSettings;
use crate::core::retry::calculate_retry_delay;
use crate::metrics::StoreMetrics;
use crate::store::{EmbeddingStore, MetadataStore, Namespace, StoreSnapshot, VectorIndex, VectorRecord};

use super::error::{BackupError, BackupResult};
use super::manifest::{
    artifact_checksum, generate_backup_id, parse_backup_id, validate_backup_id, BackupManifest,
    MANIFEST_NAME, METADATA_ARTIFACT, SCHEMA_VERSION,
};
use super::retention::{plan_cleanup, BackupEntry};
use super::storage::ObjectStorage;

/// Outcome of a successful verification pass
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub backup_id: String,
    /// Artifacts whose checksums matched the manifest
    pub artifacts_verified: Vec<String>,
    /// Record counts confirmed against the manifest, per namespace label
    pub index_sizes: BTreeMap<String, u64>,
    pub source_key_count: u64,
}

pub struct BackupManager {
    settings: BackupSettings,
    store: Arc<EmbeddingStore>,
    remote: Option<Arc<dyn ObjectStorage>>,
    metrics: Arc<StoreMetrics>,
}

impl BackupManager {
    pub fn new(
        settings: BackupSettings,
        store: Arc<EmbeddingStore>,
        metrics: Arc<StoreMetrics>,
    ) -> Self {
        Self {
            settings,
            store,
            remote: None,
            metrics,
        }
    }

    /// Attach a remote object storage tier
    pub fn with_remote(mut self, remote: Arc<dyn ObjectStorage>) -> Self {
        self.remote = Some(remote);
        self
    }

    fn backup_dir(&self, backup_id: &str) -> PathBuf {
        self.settings.local_dir.join(backup_id)
    }

    fn remote_key(&self, backup_id: &str, artifact: &str) -> String {
        format!("{}/{}/{}", self.settings.remote_prefix, backup_id, artifact)
    }

    fn remote_tier(&self) -> Option<&Arc<dyn ObjectStorage>> {
        if self.settings.remote_enabled {
            self.remote.as_ref()
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Create a backup and return its id
    ///
    /// Takes a consistent snapshot without blocking concurrent writes,
    /// serializes every namespace's index plus the metadata dump, writes
    /// the manifest last, and (optionally) uploads everything to the
    /// remote tier. Any failure removes the partial local directory.
    pub async fn backup(
        &self,
        backup_id: Option<String>,
        upload_remote: bool,
    ) -> BackupResult<String> {
        let started = Instant::now();
        let backup_id = match backup_id {
            Some(id) => {
                validate_backup_id(&id)?;
                id
            }
            None => generate_backup_id(Utc::now()),
        };

        match self.run_backup(&backup_id, upload_remote).await {
            Ok(size_bytes) => {
                self.metrics
                    .record_backup_success(started.elapsed(), size_bytes, Utc::now());
                info!(
                    backup_id = %backup_id,
                    size_bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "backup finalized"
                );
                Ok(backup_id)
            }
            Err(err) => {
                self.metrics.record_backup_failure();
                error!(backup_id = %backup_id, error = %err, "backup failed");
                // A duplicate id means a finalized backup already lives in
                // that directory; it must not be swept up as a partial.
                if matches!(err, BackupError::AlreadyExists { .. }) {
                    return Err(err);
                }
                // Failed attempts must not leave artifacts that a later
                // restore or cleanup could mistake for a real backup.
                let dir = self.backup_dir(&backup_id);
                if let Err(cleanup_err) = tokio::fs::remove_dir_all(&dir).await {
                    if cleanup_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            backup_id = %backup_id,
                            error = %cleanup_err,
                            "failed to remove partial backup directory"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    async fn run_backup(&self, backup_id: &str, upload_remote: bool) -> BackupResult<u64> {
        let dir = self.backup_dir(backup_id);
        if BackupManifest::path_in(&dir).exists() {
            return Err(BackupError::AlreadyExists {
                backup_id: backup_id.to_string(),
            });
        }
        tokio::fs::create_dir_all(&dir).await?;

        // Point-in-time snapshot; writers keep going after this window.
        let snapshot = self.store.snapshot().await;
        snapshot.check_consistency()?;

        let mut artifacts: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        let mut index_sizes: BTreeMap<String, u64> = BTreeMap::new();

        let metadata_bytes = serde_json::to_vec(snapshot.metadata.entries()).map_err(|e| {
            BackupError::Serialization {
                reason: e.to_string(),
            }
        })?;
        artifacts.insert(METADATA_ARTIFACT.to_string(), metadata_bytes);

        for &ns in &Namespace::ALL {
            let index = snapshot.indices.get(&ns).ok_or_else(|| {
                BackupError::Store(crate::store::StoreError::Consistency {
                    namespace: ns.label().to_string(),
                    reason: "missing index in snapshot".to_string(),
                })
            })?;
            index_sizes.insert(ns.label().to_string(), index.len() as u64);
            artifacts.insert(ns.artifact_name().to_string(), index.to_bytes()?);
        }

        let mut checksums = BTreeMap::new();
        let mut total_size = 0u64;
        for (name, bytes) in &artifacts {
            checksums.insert(name.clone(), artifact_checksum(bytes));
            total_size += bytes.len() as u64;
            tokio::fs::write(dir.join(name), bytes).await?;
            debug!(backup_id, artifact = %name, size = bytes.len(), "artifact written");
        }

        // Manifest last: its presence is what finalizes the backup.
        let manifest = BackupManifest {
            backup_id: backup_id.to_string(),
            created_at: Utc::now(),
            index_sizes,
            checksums,
            source_key_count: snapshot.metadata.len() as u64,
            schema_version: SCHEMA_VERSION,
        };
        manifest.write_to(&dir).await?;

        if upload_remote && self.settings.remote_enabled {
            // An enabled remote tier with no storage attached is a wiring
            // bug; reporting success without uploading would hide it.
            let remote = self
                .remote
                .as_ref()
                .ok_or(BackupError::RemoteNotConfigured)?;
            for (name, bytes) in &artifacts {
                self.upload_with_retry(
                    remote,
                    &self.remote_key(backup_id, name),
                    Bytes::from(bytes.clone()),
                )
                .await?;
            }
            self.upload_with_retry(
                remote,
                &self.remote_key(backup_id, MANIFEST_NAME),
                Bytes::from(manifest.to_bytes()?),
            )
            .await?;
            info!(backup_id, "backup uploaded to remote tier");
        }

        Ok(total_size)
    }

    async fn upload_with_retry(
        &self,
        remote: &Arc<dyn ObjectStorage>,
        key: &str,
        data: Bytes,
    ) -> BackupResult<()> {
        let limit = self.settings.transfer_retry_limit.max(1);
        let mut attempt = 0u32;
        loop {
            match remote.put(key, data.clone(), true).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    if attempt >= limit {
                        return Err(BackupError::TransferExhausted {
                            attempts: attempt,
                            reason: err.to_string(),
                        });
                    }
                    let delay = calculate_retry_delay(attempt - 1);
                    warn!(
                        key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "remote upload failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Verify
    // ------------------------------------------------------------------

    /// Verify a backup without touching live state
    ///
    /// Recomputes every artifact checksum against the manifest and
    /// deserializes each index artifact to confirm its record count; the
    /// error names the first step that failed.
    pub async fn verify_backup(&self, backup_id: &str) -> BackupResult<VerificationReport> {
        self.verify_backup_inner(backup_id, true).await
    }

    /// Verification core; with `allow_download` false a backup absent from
    /// the local tier fails `NotFound` instead of being fetched remotely.
    async fn verify_backup_inner(
        &self,
        backup_id: &str,
        allow_download: bool,
    ) -> BackupResult<VerificationReport> {
        validate_backup_id(backup_id)?;
        if allow_download {
            self.ensure_local(backup_id).await?;
        } else if !BackupManifest::path_in(&self.backup_dir(backup_id)).exists() {
            return Err(BackupError::NotFound {
                backup_id: backup_id.to_string(),
            });
        }

        let dir = self.backup_dir(backup_id);
        let manifest = BackupManifest::load_from(&dir, backup_id).await?;

        let mut verified = Vec::new();
        for (artifact, expected) in &manifest.checksums {
            let path = dir.join(artifact);
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(BackupError::ArtifactMissing {
                        backup_id: backup_id.to_string(),
                        artifact: artifact.clone(),
                    });
                }
                Err(e) => return Err(e.into()),
            };
            let actual = artifact_checksum(&bytes);
            if &actual != expected {
                return Err(BackupError::ChecksumMismatch {
                    artifact: artifact.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
            verified.push(artifact.clone());
        }

        for &ns in &Namespace::ALL {
            let expected = manifest
                .index_sizes
                .get(ns.label())
                .copied()
                .ok_or_else(|| BackupError::ManifestUnreadable {
                    backup_id: backup_id.to_string(),
                    reason: format!("manifest lacks index size for namespace '{}'", ns.label()),
                })?;
            let bytes = tokio::fs::read(dir.join(ns.artifact_name())).await?;
            let index = VectorIndex::from_bytes(&bytes)?;
            if index.len() as u64 != expected {
                return Err(BackupError::CountMismatch {
                    namespace: ns.label().to_string(),
                    expected,
                    actual: index.len() as u64,
                });
            }
        }

        let metadata_bytes = tokio::fs::read(dir.join(METADATA_ARTIFACT)).await?;
        let entries: BTreeMap<String, VectorRecord> = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| BackupError::Serialization {
                reason: e.to_string(),
            })?;
        if entries.len() as u64 != manifest.source_key_count {
            return Err(BackupError::CountMismatch {
                namespace: "metadata".to_string(),
                expected: manifest.source_key_count,
                actual: entries.len() as u64,
            });
        }

        debug!(backup_id, artifacts = verified.len(), "backup verified");
        Ok(VerificationReport {
            backup_id: backup_id.to_string(),
            artifacts_verified: verified,
            index_sizes: manifest.index_sizes,
            source_key_count: manifest.source_key_count,
        })
    }

    // ------------------------------------------------------------------
    // Restore
    // ------------------------------------------------------------------

    /// Restore the live store from a backup, verify-before-swap
    ///
    /// The full replacement state is built and validated off to the side;
    /// only after every check passes does it replace live state in one
    /// atomic swap. Any failure leaves the previous live state intact.
    pub async fn restore(&self, backup_id: &str, download_remote: bool) -> BackupResult<()> {
        let result = self.run_restore(backup_id, download_remote).await;
        match &result {
            Ok(()) => {
                self.metrics.record_restore_success();
                info!(backup_id, "restore complete");
            }
            Err(err) => {
                self.metrics.record_restore_failure();
                error!(backup_id, error = %err, "restore aborted, live state untouched");
            }
        }
        result
    }

    async fn run_restore(&self, backup_id: &str, download_remote: bool) -> BackupResult<()> {
        self.verify_backup_inner(backup_id, download_remote).await?;

        let dir = self.backup_dir(backup_id);
        let metadata_bytes = tokio::fs::read(dir.join(METADATA_ARTIFACT)).await?;
        let entries: BTreeMap<String, VectorRecord> = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| BackupError::Serialization {
                reason: e.to_string(),
            })?;

        let mut indices = BTreeMap::new();
        for &ns in &Namespace::ALL {
            let bytes = tokio::fs::read(dir.join(ns.artifact_name())).await?;
            indices.insert(ns, VectorIndex::from_bytes(&bytes)?);
        }

        let snapshot = StoreSnapshot {
            metadata: MetadataStore::from_entries(entries),
            indices,
        };
        // Dimension and cross-store consistency are re-checked inside swap.
        self.store.swap(snapshot).await?;
        Ok(())
    }

    /// Make a backup's artifacts available locally, downloading them from
    /// the remote tier when the local copy is absent
    async fn ensure_local(&self, backup_id: &str) -> BackupResult<()> {
        let dir = self.backup_dir(backup_id);
        if BackupManifest::path_in(&dir).exists() {
            return Ok(());
        }
        let Some(remote) = self.remote_tier() else {
            return Err(BackupError::NotFound {
                backup_id: backup_id.to_string(),
            });
        };

        let manifest_key = self.remote_key(backup_id, MANIFEST_NAME);
        let manifest_bytes =
            remote
                .get(&manifest_key)
                .await?
                .ok_or_else(|| BackupError::NotFound {
                    backup_id: backup_id.to_string(),
                })?;
        let manifest = BackupManifest::from_bytes(&manifest_bytes, backup_id)?;

        tokio::fs::create_dir_all(&dir).await?;
        for artifact in manifest.checksums.keys() {
            let key = self.remote_key(backup_id, artifact);
            let bytes = remote
                .get(&key)
                .await?
                .ok_or_else(|| BackupError::ArtifactMissing {
                    backup_id: backup_id.to_string(),
                    artifact: artifact.clone(),
                })?;
            tokio::fs::write(dir.join(artifact), &bytes).await?;
        }
        // Manifest lands last, same finalization rule as a fresh backup.
        tokio::fs::write(BackupManifest::path_in(&dir), &manifest_bytes).await?;
        info!(backup_id, "backup downloaded from remote tier");
        Ok(())
    }

    // ------------------------------------------------------------------
    // List and cleanup
    // ------------------------------------------------------------------

    /// Known backup ids, newest first
    ///
    /// A backup counts only if its manifest exists; partial directories
    /// are invisible. When a remote tier is configured its backups merge
    /// into the listing.
    pub async fn list_backups(&self) -> BackupResult<Vec<String>> {
        let mut ids = BTreeSet::new();

        match tokio::fs::read_dir(&self.settings.local_dir).await {
            Ok(mut dir) => {
                while let Some(entry) = dir.next_entry().await? {
                    if !entry.file_type().await?.is_dir() {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy().to_string();
                    if BackupManifest::path_in(&entry.path()).exists() {
                        ids.insert(name);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(remote) = self.remote_tier() {
            let prefix = format!("{}/", self.settings.remote_prefix);
            for key in remote.list(&prefix).await? {
                let rest = &key[prefix.len()..];
                if let Some((id, artifact)) = rest.split_once('/') {
                    if artifact == MANIFEST_NAME {
                        ids.insert(id.to_string());
                    }
                }
            }
        }

        // Ids are timestamp-derived, so lexical descending is newest first.
        Ok(ids.into_iter().rev().collect())
    }

    /// Delete backups that have aged out of the retention policy
    ///
    /// Returns the ids that were deleted. Ids whose creation time cannot
    /// be read from the id are never deleted.
    pub async fn cleanup_old_backups(&self) -> BackupResult<Vec<String>> {
        let entries: Vec<BackupEntry> = self
            .list_backups()
            .await?
            .into_iter()
            .filter_map(|backup_id| {
                parse_backup_id(&backup_id).map(|created_at| BackupEntry {
                    backup_id,
                    created_at,
                })
            })
            .collect();

        let deletions = plan_cleanup(&entries, &self.settings.retention, Utc::now());
        for backup_id in &deletions {
            self.delete_backup(backup_id).await?;
            info!(backup_id = %backup_id, "expired backup deleted");
        }
        Ok(deletions)
    }

    async fn delete_backup(&self, backup_id: &str) -> BackupResult<()> {
        let dir = self.backup_dir(backup_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(remote) = self.remote_tier() {
            let prefix = format!("{}/{}/", self.settings.remote_prefix, backup_id);
            for key in remote.list(&prefix).await? {
                remote.delete(&key).await?;
            }
        }
        Ok(())
    }
}
