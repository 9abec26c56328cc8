use std::sync::Arc;

use crate::domain::{errors::DomainError, DocumentChunk, Embedding, SearchResult};
use async_trait::async_trait;

/// Read-only nearest-neighbor index over the chunks of one document set.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns at most `top_k` results ordered by non-increasing score.
    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds an immutable [`VectorIndex`] from every chunk of a document set in
/// one shot.
pub trait VectorIndexBuilder: Send + Sync {
    fn build(&self, entries: Vec<(DocumentChunk, Embedding)>) -> Arc<dyn VectorIndex>;
}
