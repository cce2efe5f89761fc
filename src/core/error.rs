//! Error types for the Chimera embedding store
//!
//! Taxonomy: validation errors are never retried, transient dependency
//! errors are retried with bounded backoff, circuit-open errors are
//! surfaced immediately so callers can apply their own fallback, and
//! consistency errors fail loudly during verify/restore.

use thiserror::Error;

use crate::backup::BackupError;
use crate::messaging::MessagingError;
use crate::store::StoreError;

/// Result type alias for Chimera operations
pub type Result<T> = std::result::Result<T, ChimeraError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum ChimeraError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("Circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration errors
///
/// These are fatal at startup: a process with an unreadable or invalid
/// configuration must not come up half-configured.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Config parse failed: {reason}")]
    ParseFailed { reason: String },

    #[error("Invalid config value: {field} = {value}")]
    InvalidValue { field: String, value: String },
}

/// Trait for error recovery strategies
pub trait ErrorRecovery {
    /// Check if the error is retryable
    fn is_retryable(&self) -> bool;

    /// Get suggested retry delay in milliseconds
    fn retry_delay_ms(&self) -> Option<u64>;

    /// Get recovery action suggestion
    fn recovery_action(&self) -> RecoveryAction;
}

/// Recovery action suggestions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry the operation
    Retry,
    /// Skip this item and continue
    Skip,
    /// Fall back to degraded behavior (stale data, skipped enrichment)
    Fallback,
    /// Abort the operation
    Abort,
}

impl ErrorRecovery for ChimeraError {
    fn is_retryable(&self) -> bool {
        match self {
            ChimeraError::Store(e) => e.is_retryable(),
            ChimeraError::Messaging(e) => e.is_retryable(),
            ChimeraError::Backup(e) => e.is_retryable(),
            // The breaker owns the cooldown; callers must not retry past it.
            ChimeraError::CircuitOpen { .. } => false,
            ChimeraError::Config(_) => false,
            ChimeraError::Io(_) => true,
            ChimeraError::Internal(_) => false,
        }
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            ChimeraError::Store(e) => e.retry_delay_ms(),
            ChimeraError::Messaging(e) => e.retry_delay_ms(),
            ChimeraError::Backup(e) => e.retry_delay_ms(),
            ChimeraError::Io(_) => Some(1000),
            _ => None,
        }
    }

    fn recovery_action(&self) -> RecoveryAction {
        match self {
            ChimeraError::Store(e) => e.recovery_action(),
            ChimeraError::Messaging(e) => e.recovery_action(),
            ChimeraError::Backup(e) => e.recovery_action(),
            ChimeraError::CircuitOpen { .. } => RecoveryAction::Fallback,
            ChimeraError::Config(_) => RecoveryAction::Abort,
            ChimeraError::Io(_) => RecoveryAction::Retry,
            ChimeraError::Internal(_) => RecoveryAction::Abort,
        }
    }
}
