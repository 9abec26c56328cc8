use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::{ports::ByteStore, DomainError};

pub struct InMemoryByteStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryByteStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryByteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ByteStore for InMemoryByteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DomainError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| DomainError::cache_io(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), DomainError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| DomainError::cache_io(e.to_string()))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryByteStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.put("a", &[7]).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(vec![7]));
        assert_eq!(store.len(), 1);
    }
}
