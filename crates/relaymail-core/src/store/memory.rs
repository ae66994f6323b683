//! In-memory object store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use super::{ObjectStore, Presigner, StoreError};

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<String, Bytes>,
    failing_gets: HashSet<String>,
    fail_puts: bool,
    fail_deletes: bool,
    fail_presign: bool,
    get_delay: Option<Duration>,
}

/// Object store kept in process memory.
///
/// Clones share the same objects, so a test can keep one handle to inspect
/// what the relay stored or deleted. Individual operations can be made to
/// fail or stall to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores an object directly, bypassing failure injection.
    pub fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>) {
        self.lock().objects.insert(key.into(), body.into());
    }

    /// Returns the object stored under `key`, if any.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.lock().objects.get(key).cloned()
    }

    /// Returns true if an object is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().objects.contains_key(key)
    }

    /// Returns all stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Makes every `get` of `key` fail with a backend error.
    pub fn fail_get(&self, key: impl Into<String>) {
        self.lock().failing_gets.insert(key.into());
    }

    /// Makes every `put` fail with a backend error.
    pub fn fail_puts(&self, fail: bool) {
        self.lock().fail_puts = fail;
    }

    /// Makes every `delete` fail with a backend error.
    pub fn fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    /// Makes every `presign_get` fail with a backend error.
    pub fn fail_presign(&self, fail: bool) {
        self.lock().fail_presign = fail;
    }

    /// Delays every `get` by `delay`.
    pub fn delay_gets(&self, delay: Option<Duration>) {
        self.lock().get_delay = delay;
    }
}

impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let delay = self.lock().get_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let inner = self.lock();
        if inner.failing_gets.contains(key) {
            return Err(StoreError::Backend(format!("get {key} refused")));
        }
        inner
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_puts {
            return Err(StoreError::Backend(format!("put {key} refused")));
        }
        debug!(key = %key, size = body.len(), "Stored object in memory");
        inner.objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_deletes {
            return Err(StoreError::Backend(format!("delete {} refused", keys.join(", "))));
        }
        for key in keys {
            inner.objects.remove(key);
        }
        Ok(())
    }
}

impl Presigner for MemoryObjectStore {
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        if self.lock().fail_presign {
            return Err(StoreError::Backend(format!("presign {key} refused")));
        }
        Ok(format!("memory://{key}?expires_in={}", ttl.as_secs()))
    }
}
