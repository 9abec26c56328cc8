use std::sync::Arc;
use tracing::{instrument, warn};

use crate::domain::{
    ports::{EmbeddingProvider, VectorIndex},
    DomainError, SearchResult,
};

/// Top-k retriever over one built index.
///
/// Questions are embedded with the provider directly; they do not go through
/// the embedding cache.
#[derive(Clone)]
pub struct RagService {
    embedding: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    default_top_k: usize,
}

impl RagService {
    pub fn new(
        embedding: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedding,
            index,
            default_top_k,
        }
    }

    #[instrument(skip(self), fields(top_k = self.default_top_k))]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>, DomainError> {
        self.retrieve_top_k(query, self.default_top_k).await
    }

    #[instrument(skip(self))]
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let embedding = self.embedding.embed(query).await?;
        let results = self.index.search(&embedding, top_k).await?;

        if results.is_empty() {
            warn!(indexed = self.index.len(), "retrieval returned no context");
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::test_support::CountingEmbedder;
    use crate::domain::ports::VectorIndexBuilder;
    use crate::domain::{DocumentChunk, DocumentFormat, LoadedDocument};
    use crate::infrastructure::InMemoryIndexBuilder;

    fn index(texts: &[&str]) -> Arc<dyn VectorIndex> {
        let doc = LoadedDocument::new("doc.txt", DocumentFormat::PlainText, texts.join("\n"));
        let entries = texts
            .iter()
            .enumerate()
            .map(|(i, t)| (DocumentChunk::new(&doc, *t, 0, i), CountingEmbedder::vector(t)))
            .collect();
        InMemoryIndexBuilder.build(entries)
    }

    #[tokio::test]
    async fn test_retrieve_most_similar_first() {
        let embedder = Arc::new(CountingEmbedder::default());
        let rag = RagService::new(
            embedder.clone(),
            index(&["zzz yyy", "abc abc", "xyz"]),
            2,
        );

        let results = rag.retrieve("abc").await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.content, "abc abc");
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_from_empty_index() {
        let rag = RagService::new(Arc::new(CountingEmbedder::default()), index(&[]), 4);
        assert!(rag.retrieve("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_propagates_provider_error() {
        let rag = RagService::new(Arc::new(CountingEmbedder::failing()), index(&["a"]), 4);
        let err = rag.retrieve("a").await.unwrap_err();
        assert!(matches!(err, DomainError::EmbeddingProvider(_)));
    }
}
