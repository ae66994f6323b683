//! Directory-backed object store.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tracing::debug;

use super::{ObjectStore, Presigner, StoreError};

/// Sequence for temporary file names, shared by every store in the process.
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Object store that keeps each object as a file under a root directory.
///
/// Keys map to relative paths, so `inbound/abc` lives at
/// `{root}/inbound/abc`. Keys that would escape the root are rejected.
/// Writes go to a temporary file that is renamed over the target, so a
/// reader sees either the old object or the new one.
#[derive(Debug, Clone)]
pub struct DirectoryObjectStore {
    root: PathBuf,
}

impl DirectoryObjectStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(StoreError::Backend(format!("invalid object key: {key:?}")));
        }
        Ok(self.root.join(relative))
    }
}

/// Hidden sibling of `path` used while writing it.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    let n = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
}

fn map_io(key: &str, e: &io::Error) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::Backend(format!("{key}: {e}"))
    }
}

impl ObjectStore for DirectoryObjectStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.path_for(key)?;
        let data = tokio::fs::read(&path).await.map_err(|e| map_io(key, &e))?;
        debug!(key = %key, size = data.len(), "Read object from directory");
        Ok(Bytes::from(data))
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(key, &e))?;
        }

        let temp = temp_path(&path);
        let written = match tokio::fs::write(&temp, &body).await {
            Ok(()) => tokio::fs::rename(&temp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(map_io(key, &e));
        }

        debug!(key = %key, size = body.len(), "Wrote object to directory");
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        for key in keys {
            let path = self.path_for(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(key = %key, "Deleted object from directory"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(map_io(key, &e)),
            }
        }
        Ok(())
    }
}

impl Presigner for DirectoryObjectStore {
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        let path = self.path_for(key)?;
        let path = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| map_io(key, &e))?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Backend(format!("invalid link lifetime: {e}")))?;
        let expires = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| StoreError::Backend(format!("link lifetime out of range: {ttl}")))?
            .timestamp();
        Ok(format!("file://{}?expires={expires}", path.display()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_nested_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(dir.path());

        store
            .put("inbound/msg-1", Bytes::from_static(b"raw"))
            .await
            .unwrap();

        assert_eq!(store.get("inbound/msg-1").await.unwrap(), Bytes::from_static(b"raw"));
        assert!(dir.path().join("inbound").join("msg-1").exists());
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(dir.path());

        assert_eq!(
            store.get("nope").await.unwrap_err(),
            StoreError::NotFound("nope".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(dir.path());
        store.put("a", Bytes::from_static(b"1")).await.unwrap();

        store
            .delete(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert!(!dir.path().join("a").exists());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(dir.path());

        for key in ["../etc/passwd", "/abs", "", "a/../../b"] {
            assert!(
                matches!(store.get(key).await, Err(StoreError::Backend(_))),
                "key {key:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_presign_file_link() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(dir.path());
        store.put("msg", Bytes::from_static(b"x")).await.unwrap();

        let link = store
            .presign_get("msg", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(link.starts_with("file://"));
        assert!(link.contains("msg?expires="));
        assert!(store.presign_get("gone", Duration::from_secs(60)).await.is_err());
    }

    #[tokio::test]
    async fn test_presign_out_of_range_lifetime_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(dir.path());
        store.put("msg", Bytes::from_static(b"x")).await.unwrap();

        for ttl in [Duration::from_secs(10_000_000_000_000), Duration::MAX] {
            assert!(matches!(
                store.presign_get("msg", ttl).await,
                Err(StoreError::Backend(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_put_replaces_object_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(dir.path());

        store.put("blocks.txt", Bytes::from_static(b"a@example.com\n")).await.unwrap();
        store
            .put("blocks.txt", Bytes::from_static(b"a@example.com\nb@example.com\n"))
            .await
            .unwrap();

        assert_eq!(
            store.get("blocks.txt").await.unwrap(),
            Bytes::from_static(b"a@example.com\nb@example.com\n")
        );
        let names: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("blocks.txt")]);
    }

    #[tokio::test]
    async fn test_failed_put_keeps_previous_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(dir.path());
        store.put("blocks.txt", Bytes::from_static(b"old\n")).await.unwrap();
        std::fs::create_dir(dir.path().join("dir")).unwrap();
        std::fs::write(dir.path().join("dir").join("inner"), b"x").unwrap();

        assert!(store.put("dir", Bytes::from_static(b"new")).await.is_err());

        assert_eq!(
            store.get("blocks.txt").await.unwrap(),
            Bytes::from_static(b"old\n")
        );
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
