use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{
    ports::{VectorIndex, VectorIndexBuilder},
    DocumentChunk, DomainError, Embedding, SearchResult,
};

/// Exact cosine-similarity index, immutable once built.
pub struct InMemoryVectorIndex {
    entries: Vec<(DocumentChunk, Embedding)>,
}

impl InMemoryVectorIndex {
    pub fn build(entries: Vec<(DocumentChunk, Embedding)>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, embedding))| {
                let score = query.cosine_similarity(embedding);
                (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();

        // Stable: equal scores keep chunk order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| SearchResult {
                chunk: self.entries[i].0.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryIndexBuilder;

impl VectorIndexBuilder for InMemoryIndexBuilder {
    fn build(&self, entries: Vec<(DocumentChunk, Embedding)>) -> Arc<dyn VectorIndex> {
        Arc::new(InMemoryVectorIndex::build(entries))
    }
}
