mod answer;
mod embedding_cache;
mod indexing;
mod rag;
mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use answer::{AnswerEvent, AnswerGenerator, AnswerStream, CancelHandle, GenerationState};
pub use embedding_cache::{cache_namespace, content_hash, CachedEmbeddings};
pub use indexing::{read_document, IndexingService, KnowledgeBase};
pub use rag::RagService;
pub use session::{ChatSession, GREETING};
