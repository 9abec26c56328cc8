mod byte_store;
mod document_loader;
mod embedding;
mod llm;
mod vector_index;

pub use byte_store::ByteStore;
pub use document_loader::DocumentLoader;
pub use embedding::EmbeddingProvider;
pub use llm::{LlmProvider, TokenStream};
pub use vector_index::{VectorIndex, VectorIndexBuilder};
