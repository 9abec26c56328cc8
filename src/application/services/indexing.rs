use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::application::services::embedding_cache::{cache_namespace, CachedEmbeddings};
use crate::application::services::rag::RagService;
use crate::domain::{
    ports::{ByteStore, DocumentLoader, EmbeddingProvider, VectorIndexBuilder},
    Document, DocumentChunk, DomainError, LoadedDocument, SearchResult, TextSplitter,
};

/// A document set that has been loaded, split, embedded and indexed.
pub struct KnowledgeBase {
    namespace: String,
    documents: Vec<LoadedDocument>,
    chunk_count: usize,
    retriever: RagService,
}

impl KnowledgeBase {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn documents(&self) -> &[LoadedDocument] {
        &self.documents
    }

    pub fn document_names(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>, DomainError> {
        self.retriever.retrieve(question).await
    }
}

/// Build phase of the pipeline: load, split, embed through the cache, index.
pub struct IndexingService {
    loader: Arc<dyn DocumentLoader>,
    embedding: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn ByteStore>,
    index_builder: Arc<dyn VectorIndexBuilder>,
    splitter: TextSplitter,
    top_k: usize,
    batch_size: usize,
}

impl IndexingService {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedding: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn ByteStore>,
        index_builder: Arc<dyn VectorIndexBuilder>,
        splitter: TextSplitter,
        top_k: usize,
    ) -> Self {
        Self {
            loader,
            embedding,
            store,
            index_builder,
            splitter,
            top_k,
            batch_size: 64,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn build(&self, documents: Vec<Document>) -> Result<KnowledgeBase, DomainError> {
        let names: Vec<&str> = documents.iter().map(|d| d.name.as_str()).collect();
        let namespace = cache_namespace(&names);

        let mut loaded = Vec::with_capacity(documents.len());
        for document in &documents {
            let doc = self.loader.load(document).await?;
            info!(name = %doc.name, format = doc.format.as_str(), chars = doc.text.len(), "document loaded");
            loaded.push(doc);
        }

        let chunks = self.split(&loaded);
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();

        let cache = CachedEmbeddings::new(self.embedding.clone(), self.store.clone(), &namespace)
            .with_batch_size(self.batch_size);
        let embeddings = cache.get_or_compute_batch(&texts).await?;

        let chunk_count = chunks.len();
        let index = self
            .index_builder
            .build(chunks.into_iter().zip(embeddings).collect());

        info!(%namespace, chunks = chunk_count, "knowledge base built");

        Ok(KnowledgeBase {
            namespace,
            documents: loaded,
            chunk_count,
            retriever: RagService::new(self.embedding.clone(), index, self.top_k),
        })
    }

    /// Reads each path from disk and builds over the resulting documents.
    pub async fn build_from_paths<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Result<KnowledgeBase, DomainError> {
        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            documents.push(read_document(path.as_ref()).await?);
        }
        self.build(documents).await
    }

    fn split(&self, documents: &[LoadedDocument]) -> Vec<DocumentChunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.splitter
                    .split(&doc.text)
                    .map(move |chunk| (doc, chunk))
            })
            .enumerate()
            .map(|(i, (doc, chunk))| DocumentChunk::new(doc, chunk.text, chunk.offset, i))
            .collect()
    }
}

pub async fn read_document(path: &Path) -> Result<Document, DomainError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DomainError::load(format!("{}: {e}", path.display())))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string());

    Ok(Document::new(name, bytes))
}
