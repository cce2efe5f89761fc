//! Messaging error types
//!
//! Callers must be able to tell "the dependency's circuit is open" apart
//! from "this one call was slow": `CircuitOpen` and `Timeout` are
//! distinct variants with distinct recovery guidance.

use thiserror::Error;

use crate::breaker::BreakerError;
use crate::core::error::{ErrorRecovery, RecoveryAction};

/// Result type for messaging operations
pub type MessagingResult<T> = std::result::Result<T, MessagingError>;

/// Messaging client specific errors
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Connection attempt failed: {reason}")]
    ConnectFailed { reason: String },

    #[error("Connection budget exhausted after {attempts} attempts: {reason}")]
    ConnectBudgetExhausted { attempts: u32, reason: String },

    #[error("Not connected to the broker")]
    NotConnected,

    #[error("Circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    #[error("Request on '{subject}' timed out after {timeout_ms}ms")]
    Timeout { subject: String, timeout_ms: u64 },

    #[error("Publish failed: {reason}")]
    Publish { reason: String },

    #[error("Request failed: {reason}")]
    Request { reason: String },

    #[error("Subscribe failed: {reason}")]
    Subscribe { reason: String },

    #[error("Payload serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Drain failed: {reason}")]
    Drain { reason: String },
}

impl From<BreakerError<MessagingError>> for MessagingError {
    fn from(err: BreakerError<MessagingError>) -> Self {
        match err {
            BreakerError::Open { name } => MessagingError::CircuitOpen { name },
            BreakerError::Inner(e) => e,
        }
    }
}

impl ErrorRecovery for MessagingError {
    fn is_retryable(&self) -> bool {
        match self {
            MessagingError::ConnectFailed { .. }
            | MessagingError::Timeout { .. }
            | MessagingError::Publish { .. }
            | MessagingError::Request { .. }
            | MessagingError::NotConnected => true,
            // The breaker owns the cooldown; retrying through it is
            // pointless until it half-opens.
            MessagingError::CircuitOpen { .. } => false,
            MessagingError::ConnectBudgetExhausted { .. } => false,
            MessagingError::Subscribe { .. } => false,
            MessagingError::Serialization { .. } => false,
            MessagingError::Drain { .. } => false,
        }
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
            MessagingError::CircuitOpen { .. } => RecoveryAction::Fallback,
            MessagingError::Serialization { .. } => RecoveryAction::Skip,
            MessagingError::ConnectBudgetExhausted { .. } => RecoveryAction::Abort,
            MessagingError::Subscribe { .. } | MessagingError::Drain { .. } => {
                RecoveryAction::Abort
            }
            _ => RecoveryAction::Retry,
        }
    }
}
