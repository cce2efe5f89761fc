//! Point-in-time backup, verified restore, and tiered retention

pub mod error;
pub mod manager;
pub mod manifest;
pub mod retention;
pub mod storage;

pub use error::{BackupError, BackupResult};
pub use manager::{BackupManager, VerificationReport};
pub use manifest::{BackupManifest, SCHEMA_VERSION};
pub use retention::{BackupEntry, RetentionBucket, RetentionPolicy};
pub use storage::{MemoryObjectStorage, ObjectStorage};

#[cfg(test)]
mod tests;
