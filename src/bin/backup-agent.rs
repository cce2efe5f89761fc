//! backup-agent: one-shot backup maintenance for external schedulers
//!
//! Runs against the same backup directory (and remote tier settings) as
//! the daemon. Exits non-zero on any failure so cron or a Kubernetes
//! CronJob can alert.
//!
//! Usage:
//!   backup-agent [config.toml] list
//!   backup-agent [config.toml] verify <backup_id>
//!   backup-agent [config.toml] cleanup

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;

use chimera_store::backup::BackupManager;
use chimera_store::core::config::AppConfig;
use chimera_store::logging;
use chimera_store::metrics::StoreMetrics;
use chimera_store::store::EmbeddingStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    // An optional leading config path, then the command.
    let config_path = if args.first().is_some_and(|a| a.ends_with(".toml")) {
        Some(PathBuf::from(args.remove(0)))
    } else {
        None
    };
    let config = AppConfig::load(config_path.as_deref()).context("configuration rejected")?;
    let _log_guard = logging::init(&config.logging).context("logging initialization failed")?;

    let metrics = Arc::new(StoreMetrics::new());
    let store = Arc::new(EmbeddingStore::new(config.store.clone(), Arc::clone(&metrics)));
    let backups = BackupManager::new(config.backup.clone(), store, metrics);

    match args.first().map(String::as_str) {
        Some("list") => {
            for backup_id in backups.list_backups().await? {
                println!("{backup_id}");
            }
        }
        Some("verify") => {
            let backup_id = args
                .get(1)
                .context("usage: backup-agent [config.toml] verify <backup_id>")?;
            let report = backups.verify_backup(backup_id).await?;
            info!(
                backup_id = %report.backup_id,
                artifacts = report.artifacts_verified.len(),
                keys = report.source_key_count,
                "backup verified"
            );
        }
        Some("cleanup") => {
            let deleted = backups.cleanup_old_backups().await?;
            info!(deleted = deleted.len(), "retention cleanup complete");
            for backup_id in deleted {
                println!("deleted {backup_id}");
            }
        }
        Some(other) => bail!("unknown command '{other}' (expected list, verify, cleanup)"),
        None => bail!("missing command (expected list, verify, cleanup)"),
    }
    Ok(())
}
