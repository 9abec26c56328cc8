use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ports::ByteStore, DomainError};

static VALID_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._\-/]+$").expect("valid regex"));

/// Byte store rooted at a directory; `/` in keys maps to subdirectories.
pub struct FileByteStore {
    root: PathBuf,
}

impl FileByteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, DomainError> {
        let traversal = key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
        if !VALID_KEY.is_match(key) || traversal {
            return Err(DomainError::cache_io(format!("invalid cache key {key:?}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ByteStore for FileByteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DomainError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DomainError::cache_io(format!("{}: {e}", path.display()))),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), DomainError> {
        let path = self.path_for(key)?;
        let io_err = |e: std::io::Error| DomainError::cache_io(format!("{}: {e}", path.display()));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        // Readers only ever see complete entries.
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, value).await.map_err(io_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }

        debug!(key, bytes = value.len(), "cache entry written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileByteStore::new(dir.path());

        assert_eq!(store.get("doc-1/abc").await.unwrap(), None);
        store.put("doc-1/abc", &[1, 2, 3]).await.unwrap();

        assert_eq!(store.get("doc-1/abc").await.unwrap(), Some(vec![1, 2, 3]));
        assert!(dir.path().join("doc-1").join("abc").is_file());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileByteStore::new(dir.path())
            .put("ns/key", b"persisted")
            .await
            .unwrap();

        let reopened = FileByteStore::new(dir.path());
        assert_eq!(
            reopened.get("ns/key").await.unwrap().as_deref(),
            Some(&b"persisted"[..])
        );
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileByteStore::new(dir.path());

        store.put("k", b"old").await.unwrap();
        store.put("k", b"new").await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(b"new".to_vec()));
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileByteStore::new(dir.path());

        for key in ["../escape", "a/../../b", "/abs", "has space", "a//b", ""] {
            let err = store.put(key, b"x").await.unwrap_err();
            assert!(matches!(err, DomainError::CacheIo(_)), "{key}");
        }
    }
}
