//! Backup and restore error types

use thiserror::Error;

use crate::core::error::{ErrorRecovery, RecoveryAction};
use crate::store::StoreError;

/// Result type for backup operations
pub type BackupResult<T> = std::result::Result<T, BackupError>;

/// Backup subsystem specific errors
///
/// Verification failures name the artifact and the step that failed so a
/// rejected restore can report exactly what was wrong.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Backup '{backup_id}' not found")]
    NotFound { backup_id: String },

    #[error("Backup '{backup_id}' already exists")]
    AlreadyExists { backup_id: String },

    #[error("Invalid backup id '{backup_id}': {reason}")]
    InvalidBackupId { backup_id: String, reason: String },

    #[error("Manifest for backup '{backup_id}' is unreadable: {reason}")]
    ManifestUnreadable { backup_id: String, reason: String },

    #[error("Artifact '{artifact}' missing from backup '{backup_id}'")]
    ArtifactMissing { backup_id: String, artifact: String },

    #[error("Checksum mismatch for artifact '{artifact}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("Record count mismatch for namespace '{namespace}': manifest says {expected}, artifact has {actual}")]
    CountMismatch {
        namespace: String,
        expected: u64,
        actual: u64,
    },

    #[error("Unsupported backup schema version {found} (supported: {supported})")]
    SchemaVersion { found: u32, supported: u32 },

    #[error("Remote tier is enabled but no object storage is attached")]
    RemoteNotConfigured,

    #[error("Remote storage error: {reason}")]
    Remote { reason: String },

    #[error("Remote transfer failed after {attempts} attempts: {reason}")]
    TransferExhausted { attempts: u32, reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorRecovery for BackupError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackupError::Remote { .. } | BackupError::Io(_)
        )
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        if self.is_retryable() {
            Some(1000)
        } else {
            None
        }
    }

    fn recovery_action(&self) -> RecoveryAction {
        match self {
            BackupError::Remote { .. } | BackupError::Io(_) => RecoveryAction::Retry,
            // Integrity failures must never be papered over.
            BackupError::ChecksumMismatch { .. }
            | BackupError::CountMismatch { .. }
            | BackupError::SchemaVersion { .. }
            | BackupError::ManifestUnreadable { .. } => RecoveryAction::Abort,
            BackupError::NotFound { .. }
            | BackupError::AlreadyExists { .. }
            | BackupError::InvalidBackupId { .. }
            | BackupError::ArtifactMissing { .. } => RecoveryAction::Abort,
            BackupError::RemoteNotConfigured => RecoveryAction::Abort,
            BackupError::TransferExhausted { .. } => RecoveryAction::Abort,
            BackupError::Serialization { .. } => RecoveryAction::Abort,
            BackupError::Store(e) => e.recovery_action(),
        }
    }
}
