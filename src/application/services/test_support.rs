//! Doubles for the provider ports used across service tests.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::domain::{
    ports::{DocumentLoader, EmbeddingProvider, LlmProvider, TokenStream},
    Document, DocumentFormat, DomainError, Embedding, LoadedDocument, PromptContext,
};

/// Deterministic bag-of-letters embedder that counts provider calls.
#[derive(Default)]
pub struct CountingEmbedder {
    pub calls: AtomicUsize,
    pub texts_embedded: AtomicUsize,
    pub fail: bool,
    /// Number of upcoming single-text `embed` calls that fail.
    pub query_failures: AtomicUsize,
}

impl CountingEmbedder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn fail_next_queries(&self, n: usize) {
        self.query_failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts_embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Embedding {
        let mut v = vec![0.0f32; 26];
        for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
            v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        Embedding::new(v)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query_failure = self
            .query_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if self.fail || query_failure {
            return Err(DomainError::embedding("provider unavailable"));
        }
        self.texts_embedded.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DomainError::embedding("provider unavailable"));
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        26
    }
}

/// Replays a fixed token script; `Err` entries become provider faults.
pub struct ScriptedLlm {
    script: Vec<Result<String, String>>,
    pub prompts: Mutex<Vec<PromptContext>>,
}

impl ScriptedLlm {
    pub fn tokens(tokens: &[&str]) -> Self {
        Self::new(tokens.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn new(script: Vec<Result<String, String>>) -> Self {
        Self {
            script,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn stream(&self, prompt: &PromptContext) -> Result<TokenStream, DomainError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let items: Vec<_> = self
            .script
            .iter()
            .map(|item| item.clone().map_err(DomainError::generation))
            .collect();
        Ok(stream::iter(items).boxed())
    }
}

/// Loader that treats every document as UTF-8 text, with optional failures
/// keyed by document name.
#[derive(Default)]
pub struct TextLoader {
    pub broken: HashMap<String, String>,
}

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self, document: &Document) -> Result<LoadedDocument, DomainError> {
        if let Some(reason) = self.broken.get(&document.name) {
            return Err(DomainError::load(reason.clone()));
        }
        Ok(LoadedDocument::new(
            &document.name,
            DocumentFormat::PlainText,
            String::from_utf8_lossy(&document.bytes),
        ))
    }
}
