use async_trait::async_trait;
use rig::client::{EmbeddingsClient, ProviderClient};
use rig::embeddings::EmbeddingsBuilder;
use rig::providers::openai;
use std::collections::HashMap;

use crate::domain::{ports::EmbeddingProvider, DomainError, Embedding};
use crate::infrastructure::config::EmbeddingConfig;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// OpenAI embeddings through `rig`.
pub struct OpenAiEmbedding {
    model: String,
    dimension: usize,
}

impl OpenAiEmbedding {
    /// Fails early when the API key is missing instead of panicking inside
    /// the client on first use.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, DomainError> {
        ensure_api_key()?;
        Ok(Self {
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }

    fn vector(emb: rig::embeddings::Embedding) -> Embedding {
        Embedding::new(emb.vec.into_iter().map(|x| x as f32).collect())
    }
}

pub(crate) fn ensure_api_key() -> Result<(), DomainError> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(()),
        _ => Err(DomainError::validation(format!("{API_KEY_ENV} is not set"))),
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        let client = openai::Client::from_env();
        let model = client.embedding_model(&self.model);

        let embeddings = EmbeddingsBuilder::new(model)
            .document(text.to_string())
            .map_err(|e| DomainError::embedding(e.to_string()))?
            .build()
            .await
            .map_err(|e| DomainError::embedding(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .map(|(_doc, emb)| Self::vector(emb.first()))
            .ok_or_else(|| DomainError::embedding("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = openai::Client::from_env();
        let model = client.embedding_model(&self.model);

        let mut builder = EmbeddingsBuilder::new(model);
        for text in texts {
            builder = builder
                .document(text.to_string())
                .map_err(|e| DomainError::embedding(e.to_string()))?;
        }

        let embeddings = builder
            .build()
            .await
            .map_err(|e| DomainError::embedding(e.to_string()))?;

        let by_text: HashMap<String, Embedding> = embeddings
            .into_iter()
            .map(|(doc, emb)| (doc, Self::vector(emb.first())))
            .collect();

        texts
            .iter()
            .map(|text| {
                by_text
                    .get(*text)
                    .cloned()
                    .ok_or_else(|| DomainError::embedding("missing embedding in batch response"))
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
