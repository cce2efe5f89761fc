//! Configuration module for the Chimera embedding store
//!
//! Handles application configuration including:
//! - Embedding store settings (dimension, distance metric)
//! - NATS messaging and circuit breaker tuning
//! - Backup directories, remote tier and retention policy

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backup::RetentionPolicy;
use crate::core::error::ConfigError;
use crate::messaging::MessagingConfig;
use crate::store::StoreConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Service name used for breaker naming and log context
    pub service_name: ServiceName,

    /// Embedding store settings
    pub store: StoreConfig,

    /// Messaging client settings
    pub messaging: MessagingConfig,

    /// Backup settings
    pub backup: BackupSettings,

    /// Logging settings
    pub logging: LoggingSettings,
}

/// Newtype so the default service name can live next to the config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(pub String);

impl Default for ServiceName {
    fn default() -> Self {
        ServiceName("chimera-store".to_string())
    }
}

/// Backup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Local directory for backup staging and the local tier
    pub local_dir: PathBuf,

    /// Key prefix under which artifacts are stored on the remote tier
    pub remote_prefix: String,

    /// Whether a remote object storage tier is configured
    pub remote_enabled: bool,

    /// Maximum upload/download attempts per artifact
    pub transfer_retry_limit: u32,

    /// Tiered retention policy
    pub retention: RetentionPolicy,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::from("data/backups"),
            remote_prefix: "vector_store_backups".to_string(),
            remote_enabled: false,
            transfer_retry_limit: 3,
            retention: RetentionPolicy::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log filter directive, e.g. "info" or "chimera_store=debug"
    pub level: String,

    /// Emit JSON-formatted logs
    pub json: bool,

    /// Optional directory for rolling file output
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file plus `CHIMERA_*`
    /// environment overrides (e.g. `CHIMERA_STORE__DIMENSION=768`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CHIMERA")
                .separator("__")
                .try_parsing(true),
        );

        let settings: AppConfig = builder
            .build()
            .map_err(|e| ConfigError::ParseFailed {
                reason: e.to_string(),
            })?
            .try_deserialize()
            .map_err(|e| ConfigError::ParseFailed {
                reason: e.to_string(),
            })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations the rest of the system cannot run with
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.store.dimension == 0 {
            return Err(ConfigError::InvalidValue {
                field: "store.dimension".to_string(),
                value: "0".to_string(),
            });
        }
        if self.backup.transfer_retry_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backup.transfer_retry_limit".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}
