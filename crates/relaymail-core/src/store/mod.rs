//! Object storage capabilities.
//!
//! The relay only needs three storage operations plus presigned links:
//! fetch a stored message or the block list, overwrite the block list, and
//! delete handled messages.

mod directory;
mod memory;

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

pub use directory::DirectoryObjectStore;
pub use memory::MemoryObjectStore;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No object is stored under the key.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The backend rejected or failed the operation.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// The call did not complete before its deadline.
    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    /// Returns true if the object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Key/value object storage.
pub trait ObjectStore: Send + Sync {
    /// Retrieves the object stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Bytes, StoreError>> + Send;

    /// Stores `body` under `key`, overwriting any existing object.
    fn put(&self, key: &str, body: Bytes) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes the objects stored under `keys`. Missing keys are not an error.
    fn delete(&self, keys: &[String]) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Generates time-bounded retrieval links for stored objects.
pub trait Presigner: Send + Sync {
    /// Returns a URL that retrieves `key` for the next `ttl`.
    fn presign_get(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;
}
