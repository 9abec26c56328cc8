use crate::domain::errors::DomainError;
use async_trait::async_trait;

/// Key-value store of raw bytes backing the embedding cache.
///
/// Keys are `/`-separated paths; implementations must tolerate concurrent
/// readers.
#[async_trait]
pub trait ByteStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DomainError>;
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), DomainError>;
}
