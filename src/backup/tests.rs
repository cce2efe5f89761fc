// ============================================================================
// Backup manager tests
// ============================================================================

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tempfile::TempDir;

use crate::core::config::BackupSettings;
use crate::metrics::StoreMetrics;
use crate::store::{EmbeddingStore, Metadata, MetadataValue, Namespace, StoreConfig};

use super::manifest::{generate_backup_id, parse_backup_id};
use super::retention::{classify, plan_cleanup, BackupEntry, RetentionBucket};
use super::*;

const DIM: usize = 4;

fn test_settings(dir: &TempDir) -> BackupSettings {
    BackupSettings {
        local_dir: dir.path().to_path_buf(),
        ..BackupSettings::default()
    }
}

fn test_store() -> Arc<EmbeddingStore> {
    Arc::new(EmbeddingStore::new(
        StoreConfig::default().with_dimension(DIM),
        Arc::new(StoreMetrics::new()),
    ))
}

async fn seed_store(store: &EmbeddingStore) {
    let mut meta = Metadata::new();
    meta.insert("content_type".to_string(), MetadataValue::from("article"));
    store
        .upsert(Namespace::Content, "doc1", vec![1.0, 0.0, 0.0, 0.0], meta)
        .await
        .unwrap();
    store
        .upsert(
            Namespace::Content,
            "doc2",
            vec![0.0, 1.0, 0.0, 0.0],
            Metadata::new(),
        )
        .await
        .unwrap();
    store
        .upsert(
            Namespace::User,
            "user1",
            vec![0.5, 0.5, 0.0, 0.0],
            Metadata::new(),
        )
        .await
        .unwrap();
}

// ----------------------------------------------------------------------------
// Backup and round-trip restore
// ----------------------------------------------------------------------------

#[tokio::test]
async fn backup_then_restore_round_trips() {
    let dir = TempDir::new().unwrap();
    let source = test_store();
    seed_store(&source).await;
    let manager = BackupManager::new(
        test_settings(&dir),
        source.clone(),
        Arc::new(StoreMetrics::new()),
    );

    let backup_id = manager.backup(None, false).await.unwrap();

    let probe = [0.9, 0.1, 0.0, 0.0];
    let before = source
        .similarity_search(Namespace::Content, &probe, 2, None)
        .await
        .unwrap();

    // Restore into a fresh store through a second manager on the same dir.
    let target = test_store();
    let manager2 = BackupManager::new(
        test_settings(&dir),
        target.clone(),
        Arc::new(StoreMetrics::new()),
    );
    manager2.restore(&backup_id, false).await.unwrap();

    assert_eq!(target.count(Namespace::Content).await.unwrap(), 2);
    assert_eq!(target.count(Namespace::User).await.unwrap(), 1);

    let after = target
        .similarity_search(Namespace::Content, &probe, 2, None)
        .await
        .unwrap();
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.id, a.id);
        assert!((b.score - a.score).abs() < 1e-6);
        assert_eq!(b.metadata, a.metadata);
    }
}

#[tokio::test]
async fn model_dimension_search_survives_restore() {
    // Default config carries the embedding model's full 384 dimensions.
    let dir = TempDir::new().unwrap();
    let source = Arc::new(EmbeddingStore::new(
        StoreConfig::default(),
        Arc::new(StoreMetrics::new()),
    ));

    let mut doc1 = vec![0.01_f32; 384];
    doc1[0] = 1.0;
    let mut doc2 = doc1.clone();
    doc2[1] = 0.2;
    let mut meta = Metadata::new();
    meta.insert("topic".to_string(), MetadataValue::from("ML"));
    source
        .upsert(Namespace::Content, "doc1", doc1.clone(), meta.clone())
        .await
        .unwrap();
    source
        .upsert(Namespace::Content, "doc2", doc2, meta)
        .await
        .unwrap();

    let hits = source
        .similarity_search(Namespace::Content, &doc1, 1, None)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "doc1");

    let manager = BackupManager::new(
        test_settings(&dir),
        source.clone(),
        Arc::new(StoreMetrics::new()),
    );
    let backup_id = manager.backup(None, false).await.unwrap();

    let target = Arc::new(EmbeddingStore::new(
        StoreConfig::default(),
        Arc::new(StoreMetrics::new()),
    ));
    let manager2 = BackupManager::new(
        test_settings(&dir),
        target.clone(),
        Arc::new(StoreMetrics::new()),
    );
    manager2.restore(&backup_id, false).await.unwrap();

    let restored = target
        .similarity_search(Namespace::Content, &doc1, 1, None)
        .await
        .unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].id, "doc1");
    assert_eq!(
        restored[0].metadata.get("topic"),
        Some(&MetadataValue::from("ML"))
    );
}

#[tokio::test]
async fn backup_records_metrics() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    seed_store(&store).await;
    let metrics = Arc::new(StoreMetrics::new());
    let manager = BackupManager::new(test_settings(&dir), store, metrics.clone());

    manager.backup(None, false).await.unwrap();

    assert_eq!(metrics.backup_successes(), 1);
    assert_eq!(metrics.backup_failures(), 0);
    assert!(metrics.backup_age_seconds(Utc::now()).is_some());
}

#[tokio::test]
async fn duplicate_backup_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    let manager = BackupManager::new(test_settings(&dir), store, Arc::new(StoreMetrics::new()));

    manager.backup(Some("b1".to_string()), false).await.unwrap();
    let err = manager
        .backup(Some("b1".to_string()), false)
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::AlreadyExists { .. }));
}

#[tokio::test]
async fn backup_id_cannot_escape_backup_directory() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    let manager = BackupManager::new(test_settings(&dir), store, Arc::new(StoreMetrics::new()));

    let err = manager
        .backup(Some("../evil".to_string()), false)
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::InvalidBackupId { .. }));
}

// ----------------------------------------------------------------------------
// Verification and corruption
// ----------------------------------------------------------------------------

#[tokio::test]
async fn verify_reports_backup_contents() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    seed_store(&store).await;
    let manager = BackupManager::new(test_settings(&dir), store, Arc::new(StoreMetrics::new()));

    let backup_id = manager.backup(None, false).await.unwrap();
    let report = manager.verify_backup(&backup_id).await.unwrap();

    assert_eq!(report.backup_id, backup_id);
    assert_eq!(report.artifacts_verified.len(), 3);
    assert_eq!(report.index_sizes.get("content"), Some(&2));
    assert_eq!(report.index_sizes.get("user"), Some(&1));
    assert_eq!(report.source_key_count, 3);
}

#[tokio::test]
async fn verify_detects_flipped_byte() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    seed_store(&store).await;
    let manager = BackupManager::new(test_settings(&dir), store, Arc::new(StoreMetrics::new()));

    let backup_id = manager.backup(None, false).await.unwrap();

    let artifact = dir
        .path()
        .join(&backup_id)
        .join(Namespace::Content.artifact_name());
    let mut bytes = std::fs::read(&artifact).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&artifact, &bytes).unwrap();

    let err = manager.verify_backup(&backup_id).await.unwrap_err();
    assert!(matches!(err, BackupError::ChecksumMismatch { .. }));
}

#[tokio::test]
async fn restore_of_corrupted_backup_leaves_live_state_intact() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    seed_store(&store).await;
    let metrics = Arc::new(StoreMetrics::new());
    let manager = BackupManager::new(test_settings(&dir), store.clone(), metrics.clone());

    let backup_id = manager.backup(None, false).await.unwrap();

    // Change the live state after the backup, then corrupt the artifact.
    store
        .upsert(
            Namespace::Content,
            "doc3",
            vec![0.0, 0.0, 1.0, 0.0],
            Metadata::new(),
        )
        .await
        .unwrap();
    let artifact = dir
        .path()
        .join(&backup_id)
        .join(Namespace::User.artifact_name());
    let mut bytes = std::fs::read(&artifact).unwrap();
    bytes[0] ^= 0xFF;
    std::fs::write(&artifact, &bytes).unwrap();

    let err = manager.restore(&backup_id, false).await.unwrap_err();
    assert!(matches!(err, BackupError::ChecksumMismatch { .. }));

    // The failed restore must not roll back or alter live data.
    assert_eq!(store.count(Namespace::Content).await.unwrap(), 3);
    assert!(store.get(Namespace::Content, "doc3").await.is_some());
    assert_eq!(metrics.backup_successes(), 1);
}

#[tokio::test]
async fn verify_missing_backup_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    let manager = BackupManager::new(test_settings(&dir), store, Arc::new(StoreMetrics::new()));

    let err = manager.verify_backup("20200101_000000").await.unwrap_err();
    assert!(matches!(err, BackupError::NotFound { .. }));
}

// ----------------------------------------------------------------------------
// Remote tier
// ----------------------------------------------------------------------------

fn remote_settings(dir: &TempDir) -> BackupSettings {
    BackupSettings {
        remote_enabled: true,
        ..test_settings(dir)
    }
}

#[tokio::test]
async fn backup_uploads_all_artifacts_to_remote() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    seed_store(&store).await;
    let remote = Arc::new(MemoryObjectStorage::new());
    let manager = BackupManager::new(remote_settings(&dir), store, Arc::new(StoreMetrics::new()))
        .with_remote(remote.clone());

    let backup_id = manager.backup(None, true).await.unwrap();

    // metadata.json + 2 index artifacts + manifest
    assert_eq!(remote.object_count(), 4);
    assert!(remote.contains(&format!("vector_store_backups/{backup_id}/manifest.json")));
}

#[tokio::test(start_paused = true)]
async fn transient_upload_failures_are_retried() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    seed_store(&store).await;
    let remote = Arc::new(MemoryObjectStorage::new());
    remote.fail_next_puts(2);
    let manager = BackupManager::new(remote_settings(&dir), store, Arc::new(StoreMetrics::new()))
        .with_remote(remote.clone());

    manager.backup(None, true).await.unwrap();
    assert_eq!(remote.object_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn exhausted_uploads_fail_the_backup_and_remove_local_artifacts() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    seed_store(&store).await;
    let remote = Arc::new(MemoryObjectStorage::new());
    remote.fail_next_puts(100);
    let metrics = Arc::new(StoreMetrics::new());
    let manager = BackupManager::new(remote_settings(&dir), store, metrics.clone())
        .with_remote(remote.clone());

    let err = manager
        .backup(Some("doomed".to_string()), true)
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::TransferExhausted { .. }));
    assert_eq!(metrics.backup_failures(), 1);
    // Partial local artifacts are gone; the backup is invisible.
    assert!(!dir.path().join("doomed").exists());
    assert!(manager.list_backups().await.unwrap().is_empty());
}

#[tokio::test]
async fn restore_without_download_flag_stays_local_only() {
    let dir = TempDir::new().unwrap();
    let source = test_store();
    seed_store(&source).await;
    let remote = Arc::new(MemoryObjectStorage::new());
    let manager = BackupManager::new(remote_settings(&dir), source, Arc::new(StoreMetrics::new()))
        .with_remote(remote.clone());
    let backup_id = manager.backup(None, true).await.unwrap();

    // The backup lives only on the remote tier from this node's view;
    // with downloads disabled the restore must fail instead of fetching.
    let dir2 = TempDir::new().unwrap();
    let target = test_store();
    let manager2 = BackupManager::new(
        remote_settings(&dir2),
        target.clone(),
        Arc::new(StoreMetrics::new()),
    )
    .with_remote(remote);
    let err = manager2.restore(&backup_id, false).await.unwrap_err();

    assert!(matches!(err, BackupError::NotFound { .. }));
    assert!(!dir2.path().join(&backup_id).exists());
    assert_eq!(target.count(Namespace::Content).await.unwrap(), 0);
}

#[tokio::test]
async fn enabled_remote_tier_without_storage_fails_the_backup() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    seed_store(&store).await;
    let metrics = Arc::new(StoreMetrics::new());
    // remote_enabled is set but no object storage was attached.
    let manager = BackupManager::new(remote_settings(&dir), store, metrics.clone());

    let err = manager
        .backup(Some("b1".to_string()), true)
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::RemoteNotConfigured));
    assert_eq!(metrics.backup_failures(), 1);
    assert!(!dir.path().join("b1").exists());
}

#[tokio::test]
async fn restore_downloads_from_remote_when_local_copy_is_missing() {
    let dir = TempDir::new().unwrap();
    let source = test_store();
    seed_store(&source).await;
    let remote = Arc::new(MemoryObjectStorage::new());
    let manager = BackupManager::new(remote_settings(&dir), source, Arc::new(StoreMetrics::new()))
        .with_remote(remote.clone());
    let backup_id = manager.backup(None, true).await.unwrap();

    // A different node with an empty local dir restores from remote.
    let dir2 = TempDir::new().unwrap();
    let target = test_store();
    let manager2 =
        BackupManager::new(remote_settings(&dir2), target.clone(), Arc::new(StoreMetrics::new()))
            .with_remote(remote);
    manager2.restore(&backup_id, true).await.unwrap();

    assert_eq!(target.count(Namespace::Content).await.unwrap(), 2);
    assert_eq!(target.count(Namespace::User).await.unwrap(), 1);
}

// ----------------------------------------------------------------------------
// Listing
// ----------------------------------------------------------------------------

#[tokio::test]
async fn list_backups_is_newest_first_and_skips_partials() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    let manager = BackupManager::new(test_settings(&dir), store, Arc::new(StoreMetrics::new()));

    manager
        .backup(Some("20240101_000000".to_string()), false)
        .await
        .unwrap();
    manager
        .backup(Some("20240301_000000".to_string()), false)
        .await
        .unwrap();
    manager
        .backup(Some("20240201_000000".to_string()), false)
        .await
        .unwrap();

    // A directory without a manifest is a failed attempt, not a backup.
    std::fs::create_dir(dir.path().join("20240401_000000")).unwrap();

    let ids = manager.list_backups().await.unwrap();
    assert_eq!(
        ids,
        vec![
            "20240301_000000".to_string(),
            "20240201_000000".to_string(),
            "20240101_000000".to_string(),
        ]
    );
}

// ----------------------------------------------------------------------------
// Retention
// ----------------------------------------------------------------------------

fn entry(backup_id: &str) -> BackupEntry {
    BackupEntry {
        backup_id: backup_id.to_string(),
        created_at: parse_backup_id(backup_id).unwrap(),
    }
}

#[test]
fn backup_id_round_trips_through_timestamp() {
    let ts = Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 45).unwrap();
    let id = generate_backup_id(ts);
    assert_eq!(id, "20240315_123045");
    assert_eq!(parse_backup_id(&id), Some(ts));
}

#[test]
fn classification_honors_calendar_eligibility() {
    let policy = RetentionPolicy::default();
    // 2024-06-14 is a Friday.
    let now = Utc.with_ymd_and_hms(2024, 6, 14, 12, 0, 0).unwrap();

    // 3 days old: daily.
    let recent = Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap();
    assert_eq!(classify(recent, now, &policy), RetentionBucket::Daily);

    // 2024-06-03 is a Monday, 11 days old: weekly.
    let monday = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
    assert_eq!(classify(monday, now, &policy), RetentionBucket::Weekly);

    // 2024-06-04 is a Tuesday, 10 days old: past the daily window and
    // not weekly-eligible, so it expires.
    let tuesday = Utc.with_ymd_and_hms(2024, 6, 4, 0, 0, 0).unwrap();
    assert_eq!(classify(tuesday, now, &policy), RetentionBucket::Expired);

    // 2024-03-01, ~3.5 months old: monthly.
    let first = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    assert_eq!(classify(first, now, &policy), RetentionBucket::Monthly);

    // A year old first-of-month is past every window.
    let ancient = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    assert_eq!(classify(ancient, now, &policy), RetentionBucket::Expired);
}

#[test]
fn plan_keeps_buckets_and_drops_the_rest() {
    let policy = RetentionPolicy::default()
        .with_retain_days(3)
        .with_retain_weekly(2)
        .with_retain_monthly(1);
    // Friday 2024-06-14.
    let now = Utc.with_ymd_and_hms(2024, 6, 14, 12, 0, 0).unwrap();

    let entries = vec![
        entry("20240614_060000"), // today: daily
        entry("20240613_060000"), // daily
        entry("20240612_060000"), // daily
        entry("20240611_060000"), // Tuesday, past the 3-day daily window: expired
        entry("20240610_060000"), // Monday, 4 days old: weekly
        entry("20240603_060000"), // Monday, 11 days old: weekly
        entry("20240527_060000"), // Monday, 18 days old, past the weekly window: expired
        entry("20240601_060000"), // 1st of the month, 13 days old: monthly
    ];

    let deletions = plan_cleanup(&entries, &policy, now);

    assert!(deletions.contains(&"20240611_060000".to_string()));
    assert!(deletions.contains(&"20240527_060000".to_string()));
    assert_eq!(deletions.len(), 2);
    assert!(!deletions.contains(&"20240614_060000".to_string()));
    assert!(!deletions.contains(&"20240610_060000".to_string()));
    assert!(!deletions.contains(&"20240603_060000".to_string()));
    assert!(!deletions.contains(&"20240601_060000".to_string()));
}

#[test]
fn sole_backup_survives_all_windows() {
    let policy = RetentionPolicy::default();
    let now = Utc.with_ymd_and_hms(2024, 6, 14, 12, 0, 0).unwrap();
    // Three years old, not a Monday, not a first-of-month.
    let entries = vec![entry("20210618_060000")];

    let deletions = plan_cleanup(&entries, &policy, now);
    assert!(deletions.is_empty());
}

#[test]
fn newest_backup_is_never_deleted_even_when_expired() {
    let policy = RetentionPolicy::default();
    let now = Utc.with_ymd_and_hms(2024, 6, 14, 12, 0, 0).unwrap();
    let entries = vec![entry("20230618_060000"), entry("20230617_060000")];

    let deletions = plan_cleanup(&entries, &policy, now);
    assert_eq!(deletions, vec!["20230617_060000".to_string()]);
}

#[tokio::test]
async fn cleanup_deletes_local_and_remote_artifacts() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    seed_store(&store).await;
    let remote = Arc::new(MemoryObjectStorage::new());
    let settings = BackupSettings {
        retention: RetentionPolicy::default()
            .with_retain_days(7)
            .with_retain_weekly(0)
            .with_retain_monthly(0),
        ..remote_settings(&dir)
    };
    let manager = BackupManager::new(settings, store, Arc::new(StoreMetrics::new()))
        .with_remote(remote.clone());

    let now = Utc::now();
    let fresh_id = generate_backup_id(now - ChronoDuration::days(1));
    let stale_id = generate_backup_id(now - ChronoDuration::days(400));
    manager.backup(Some(fresh_id.clone()), true).await.unwrap();
    manager.backup(Some(stale_id.clone()), true).await.unwrap();

    let deleted = manager.cleanup_old_backups().await.unwrap();

    assert_eq!(deleted, vec![stale_id.clone()]);
    assert!(!dir.path().join(&stale_id).exists());
    assert!(dir.path().join(&fresh_id).exists());
    assert!(!remote.contains(&format!("vector_store_backups/{stale_id}/manifest.json")));
    assert!(remote.contains(&format!("vector_store_backups/{fresh_id}/manifest.json")));
}
