//! Remote object storage tier
//!
//! The backup manager talks to the durable remote tier through the
//! `ObjectStorage` trait; the production implementation (S3 or
//! compatible) lives with the deployment, while `MemoryObjectStorage`
//! backs the tests. Keys follow `{prefix}/{backup_id}/{artifact_name}`.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use super::error::{BackupError, BackupResult};

/// Durable object storage for backup artifacts
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store an object; `encrypt` requests server-side AES-256 at rest
    async fn put(&self, key: &str, data: Bytes, encrypt: bool) -> BackupResult<()>;

    /// Fetch an object, `None` if the key does not exist
    async fn get(&self, key: &str) -> BackupResult<Option<Bytes>>;

    async fn delete(&self, key: &str) -> BackupResult<()>;

    /// Keys under a prefix, in lexical order
    async fn list(&self, prefix: &str) -> BackupResult<Vec<String>>;
}

/// In-memory object storage
///
/// Deterministic stand-in for the remote tier; can be primed to fail the
/// next N puts to exercise the transfer retry path.
#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: RwLock<BTreeMap<String, Bytes>>,
    failing_puts: AtomicU32,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` put calls fail with a transient remote error
    pub fn fail_next_puts(&self, n: u32) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(&self, key: &str, data: Bytes, _encrypt: bool) -> BackupResult<()> {
        let remaining = self.failing_puts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_puts.store(remaining - 1, Ordering::SeqCst);
            return Err(BackupError::Remote {
                reason: "injected transient failure".to_string(),
            });
        }
        self.objects.write().insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> BackupResult<Option<Bytes>> {
        Ok(self.objects.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BackupResult<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> BackupResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
