//! Embedding store error types

use thiserror::Error;

use crate::core::error::{ErrorRecovery, RecoveryAction};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Embedding store specific errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid record id: {reason}")]
    InvalidId { reason: String },

    #[error("Consistency violation in namespace '{namespace}': {reason}")]
    Consistency { namespace: String, reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

impl ErrorRecovery for StoreError {
    fn is_retryable(&self) -> bool {
        // Validation and consistency failures don't get better on retry.
        false
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        None
    }

    fn recovery_action(&self) -> RecoveryAction {
        match self {
            StoreError::InvalidDimension { .. } | StoreError::InvalidId { .. } => {
                RecoveryAction::Skip
            }
            StoreError::Consistency { .. } => RecoveryAction::Abort,
            StoreError::Serialization { .. } => RecoveryAction::Abort,
        }
    }
}
