//! chimera-stored: the embedding store daemon
//!
//! Hydrates the store from the newest verified backup, starts the
//! enrichment ingest pipeline, and runs daily backup + retention cleanup
//! until shut down. Configuration path comes as the first argument,
//! falling back to `CHIMERA_*` environment overrides alone.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use chimera_store::backup::BackupManager;
use chimera_store::core::config::AppConfig;
use chimera_store::ingest::IngestPipeline;
use chimera_store::logging;
use chimera_store::messaging::MessagingClient;
use chimera_store::metrics::StoreMetrics;
use chimera_store::store::EmbeddingStore;

const BACKUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("configuration rejected")?;

    let _log_guard = logging::init(&config.logging).context("logging initialization failed")?;
    info!(service = %config.service_name.0, "starting");

    // This binary ships no object storage backend; an enabled remote tier
    // would otherwise fail every scheduled backup at runtime.
    anyhow::ensure!(
        !config.backup.remote_enabled,
        "backup.remote_enabled is set but no remote object storage backend is available"
    );

    let metrics = Arc::new(StoreMetrics::new());
    let store = Arc::new(EmbeddingStore::new(config.store.clone(), Arc::clone(&metrics)));
    let backups = Arc::new(BackupManager::new(
        config.backup.clone(),
        Arc::clone(&store),
        Arc::clone(&metrics),
    ));

    hydrate_from_latest_backup(&backups).await;

    let client = Arc::new(
        MessagingClient::connect(config.messaging.clone(), &metrics)
            .await
            .context("broker connection failed")?,
    );

    let pipeline = IngestPipeline::new(Arc::clone(&store), Arc::clone(&metrics));
    let ingest = pipeline
        .start(Arc::clone(&client))
        .await
        .context("ingest pipeline failed to start")?;

    let upload_remote = config.backup.remote_enabled;
    let backup_loop = {
        let backups = Arc::clone(&backups);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(BACKUP_INTERVAL);
            // The first tick fires immediately; skip it so startup right
            // after a restore does not write a redundant backup.
            interval.tick().await;
            loop {
                interval.tick().await;
                match backups.backup(None, upload_remote).await {
                    Ok(backup_id) => {
                        if let Err(err) = backups.cleanup_old_backups().await {
                            warn!(error = %err, "retention cleanup failed");
                        }
                        info!(backup_id = %backup_id, "scheduled backup complete");
                    }
                    Err(err) => {
                        // Serving traffic continues; the failure is on the
                        // metrics surface for alerting.
                        error!(error = %err, "scheduled backup failed");
                    }
                }
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    backup_loop.abort();
    ingest.shutdown();
    if let Err(err) = client.close().await {
        warn!(error = %err, "messaging client did not close cleanly");
    }
    info!("stopped");
    Ok(())
}

/// Restore the newest backup, if any
///
/// A missing or unverifiable backup is not fatal at startup: the daemon
/// comes up empty and rebuilds from the event stream instead.
async fn hydrate_from_latest_backup(backups: &BackupManager) {
    let latest = match backups.list_backups().await {
        Ok(ids) => ids.into_iter().next(),
        Err(err) => {
            warn!(error = %err, "could not list backups, starting empty");
            return;
        }
    };

    match latest {
        Some(backup_id) => match backups.restore(&backup_id, true).await {
            Ok(()) => info!(backup_id = %backup_id, "hydrated from backup"),
            Err(err) => {
                warn!(backup_id = %backup_id, error = %err, "hydration failed, starting empty")
            }
        },
        None => info!("no backups found, starting empty"),
    }
}
