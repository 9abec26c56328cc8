use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::domain::{
    ports::{ByteStore, EmbeddingProvider},
    DomainError, Embedding,
};

const DEFAULT_BATCH_SIZE: usize = 64;

/// Memoizes chunk text to embedding inside one cache namespace.
///
/// Entries are keyed by `<namespace>/<sha256 of the text>` and are never
/// invalidated.
pub struct CachedEmbeddings {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn ByteStore>,
    namespace: String,
    batch_size: usize,
}

impl CachedEmbeddings {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn ByteStore>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            namespace: namespace.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn key(&self, text: &str) -> String {
        format!("{}/{}", self.namespace, content_hash(text))
    }

    /// Entries written for another model or truncated on disk do not match
    /// the provider's dimension and are rejected.
    fn decode(&self, key: &str, bytes: &[u8]) -> Result<Embedding, DomainError> {
        let embedding = Embedding::from_bytes(bytes)?;
        let expected = self.provider.dimension();
        if embedding.dimension() != expected {
            return Err(DomainError::cache_io(format!(
                "cached embedding {key} has dimension {}, expected {expected}",
                embedding.dimension()
            )));
        }
        Ok(embedding)
    }

    #[instrument(skip(self, text), fields(namespace = %self.namespace))]
    pub async fn get_or_compute(&self, text: &str) -> Result<Embedding, DomainError> {
        let key = self.key(text);

        if let Some(bytes) = self.store.get(&key).await? {
            debug!(%key, "embedding cache hit");
            return self.decode(&key, &bytes);
        }

        let embedding = self.provider.embed(text).await?;
        self.store.put(&key, &embedding.to_bytes()).await?;
        Ok(embedding)
    }

    /// Embeds `texts` in order. Distinct cache misses are sent to the provider
    /// in batches; repeated texts share one provider slot.
    #[instrument(skip(self, texts), fields(namespace = %self.namespace, count = texts.len()))]
    pub async fn get_or_compute_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        let mut resolved: Vec<Option<Embedding>> = vec![None; texts.len()];
        let mut misses: Vec<(String, &str, Vec<usize>)> = Vec::new();
        let mut miss_slots: HashMap<String, usize> = HashMap::new();

        for (i, text) in texts.iter().enumerate() {
            let key = self.key(text);
            if let Some(&slot) = miss_slots.get(&key) {
                misses[slot].2.push(i);
                continue;
            }
            match self.store.get(&key).await? {
                Some(bytes) => resolved[i] = Some(self.decode(&key, &bytes)?),
                None => {
                    miss_slots.insert(key.clone(), misses.len());
                    misses.push((key, *text, vec![i]));
                }
            }
        }

        debug!(
            hits = texts.len() - misses.iter().map(|m| m.2.len()).sum::<usize>(),
            misses = misses.len(),
            "embedding cache lookup"
        );

        for batch in misses.chunks(self.batch_size) {
            let batch_texts: Vec<&str> = batch.iter().map(|(_, text, _)| *text).collect();
            let embeddings = self.provider.embed_batch(&batch_texts).await?;

            if embeddings.len() != batch.len() {
                return Err(DomainError::embedding(format!(
                    "provider returned {} embeddings for {} texts",
                    embeddings.len(),
                    batch.len()
                )));
            }

            for ((key, _, indices), embedding) in batch.iter().zip(embeddings) {
                self.store.put(key, &embedding.to_bytes()).await?;
                for &i in indices {
                    resolved[i] = Some(embedding.clone());
                }
            }
        }

        resolved
            .into_iter()
            .map(|e| e.ok_or_else(|| DomainError::internal("unresolved embedding")))
            .collect()
    }
}

pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Cache namespace for a document (one name) or a document set.
///
/// Names are sanitized into a single path segment and suffixed with a hash of
/// the original names so that distinct inputs never share a namespace.
pub fn cache_namespace<S: AsRef<str>>(names: &[S]) -> String {
    match names {
        [name] => {
            let name = name.as_ref();
            let sanitized: String = name
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect();
            format!("{}-{}", sanitized, &content_hash(name)[..8])
        }
        _ => {
            let mut sorted: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
            sorted.sort_unstable();
            sorted.dedup();
            format!("set-{}", &content_hash(&sorted.join("\0"))[..16])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::test_support::CountingEmbedder;
    use crate::infrastructure::InMemoryByteStore;

    fn cache(
        embedder: &Arc<CountingEmbedder>,
        store: &Arc<InMemoryByteStore>,
        ns: &str,
    ) -> CachedEmbeddings {
        CachedEmbeddings::new(embedder.clone(), store.clone(), ns)
    }

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(InMemoryByteStore::new());
        let cache = cache(&embedder, &store, "doc");

        let first = cache.get_or_compute("Stroke symptoms").await.unwrap();
        let second = cache.get_or_compute("Stroke symptoms").await.unwrap();

        assert_eq!(embedder.calls(), 1);
        let bits = |e: &Embedding| e.0.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&first), bits(&second));
    }

    #[tokio::test]
    async fn test_namespaces_do_not_share_entries() {
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(InMemoryByteStore::new());

        cache(&embedder, &store, &cache_namespace(&["a.pdf"]))
            .get_or_compute("same text")
            .await
            .unwrap();
        cache(&embedder, &store, &cache_namespace(&["b.pdf"]))
            .get_or_compute("same text")
            .await
            .unwrap();

        assert_eq!(embedder.calls(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_embeds_only_distinct_misses() {
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(InMemoryByteStore::new());
        let cache = cache(&embedder, &store, "doc");

        cache.get_or_compute("cached").await.unwrap();
        let result = cache
            .get_or_compute_batch(&["new", "cached", "new", "other"])
            .await
            .unwrap();

        assert_eq!(result.len(), 4);
        assert_eq!(result[0], result[2]);
        assert_eq!(result[1], CountingEmbedder::vector("cached"));
        assert_eq!(embedder.calls(), 2);
        assert_eq!(embedder.texts_embedded(), 3);

        cache
            .get_or_compute_batch(&["new", "other", "cached"])
            .await
            .unwrap();
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn test_batch_respects_batch_size() {
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(InMemoryByteStore::new());
        let cache = cache(&embedder, &store, "doc").with_batch_size(2);

        cache
            .get_or_compute_batch(&["a", "b", "c", "d", "e"])
            .await
            .unwrap();

        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_cached() {
        let embedder = Arc::new(CountingEmbedder::failing());
        let store = Arc::new(InMemoryByteStore::new());
        let cache = cache(&embedder, &store, "doc");

        let err = cache.get_or_compute("x").await.unwrap_err();
        assert!(matches!(err, DomainError::EmbeddingProvider(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_cache_error() {
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(InMemoryByteStore::new());
        let cache = cache(&embedder, &store, "doc");

        store
            .put(&format!("doc/{}", content_hash("x")), &[1, 2, 3])
            .await
            .unwrap();

        let err = cache.get_or_compute("x").await.unwrap_err();
        assert!(matches!(err, DomainError::CacheIo(_)));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_wrong_dimension_entry_is_cache_error() {
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(InMemoryByteStore::new());
        let cache = cache(&embedder, &store, "doc");

        let short = Embedding::new(vec![0.5, 0.5]);
        store
            .put(&format!("doc/{}", content_hash("x")), &short.to_bytes())
            .await
            .unwrap();

        let err = cache.get_or_compute("x").await.unwrap_err();
        assert!(err.to_string().contains("expected 26"));
        assert!(matches!(err, DomainError::CacheIo(_)));

        let err = cache
            .get_or_compute_batch(&["y", "x"])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::CacheIo(_)));
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn test_cache_namespace() {
        let ns = cache_namespace(&["이수형 (1).pdf"]);
        assert!(ns.starts_with("_____1_.pdf-"));
        assert_ne!(cache_namespace(&["a b.pdf"]), cache_namespace(&["a_b.pdf"]));

        assert_eq!(
            cache_namespace(&["1.pdf", "2.pdf"]),
            cache_namespace(&["2.pdf", "1.pdf"])
        );
        assert!(cache_namespace(&["1.pdf", "2.pdf"]).starts_with("set-"));
    }
}
