//! Core types shared across the crate

pub mod config;
pub mod error;
pub mod retry;


pub use config::AppConfig;
pub use error::{ChimeraError, ConfigError, ErrorRecovery, RecoveryAction, Result};
pub use retry::{calculate_retry_delay, calculate_retry_delay_with_jitter};
