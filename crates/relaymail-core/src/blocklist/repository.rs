//! Block-list storage.

use std::time::Duration;

use bytes::Bytes;
use relaymail_mime::canonicalize;
use tracing::{debug, error, info, warn};

use super::model::BlockList;
use crate::deadline::with_deadline;
use crate::store::{ObjectStore, StoreError};

/// Default deadline for block-list reads and writes.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Loads and persists the block list through an [`ObjectStore`].
#[derive(Debug)]
pub struct BlockListStore<'a, S> {
    store: &'a S,
    key: String,
    call_timeout: Duration,
}

impl<'a, S: ObjectStore> BlockListStore<'a, S> {
    /// Creates a block-list store reading and writing `key` in `store`.
    #[must_use]
    pub fn new(store: &'a S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the deadline applied to each storage call.
    #[must_use]
    pub const fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Returns the key of the block-list object.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Loads the current block list.
    ///
    /// A missing object or any retrieval error yields an empty list, so a
    /// storage problem never stops a batch.
    pub async fn load(&self) -> BlockList {
        let result = with_deadline(
            self.call_timeout,
            self.store.get(&self.key),
            StoreError::Timeout,
        )
        .await;

        match result {
            Ok(body) => {
                let list = BlockList::parse(&String::from_utf8_lossy(&body));
                debug!(key = %self.key, entries = list.len(), "Loaded block list");
                list
            }
            Err(StoreError::NotFound(_)) => {
                debug!(key = %self.key, "No block list stored, nothing is blocked");
                BlockList::new()
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to load block list, nothing is blocked");
                BlockList::new()
            }
        }
    }

    /// Writes `list` back, replacing the stored object.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write or the deadline passes.
    pub async fn persist(&self, list: &BlockList) -> Result<(), StoreError> {
        let body = Bytes::from(list.to_object_body());
        with_deadline(
            self.call_timeout,
            self.store.put(&self.key, body),
            StoreError::Timeout,
        )
        .await
    }

    /// Canonicalizes `additions` into `current`, persists the result and
    /// returns the updated list.
    ///
    /// The returned list always contains the additions, even when the write
    /// fails; persistence is best effort and a failure is only logged.
    pub async fn merge_and_persist<I, A>(&self, mut current: BlockList, additions: I) -> BlockList
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        current.extend(
            additions
                .into_iter()
                .map(|raw| canonicalize(raw.as_ref()))
                .filter(|address| !address.is_empty()),
        );

        match self.persist(&current).await {
            Ok(()) => info!(key = %self.key, entries = current.len(), "Persisted block list"),
            Err(e) => error!(key = %self.key, error = %e, "Failed to persist block list"),
        }

        current
    }
}
