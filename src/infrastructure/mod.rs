pub mod config;
pub mod embedding;
pub mod llm;
pub mod loader;
pub mod store;
pub mod vector_index;

pub use config::{AnswerMode, AppConfig, Config, ConfigError, PromptsConfig};
pub use embedding::OpenAiEmbedding;
pub use llm::OpenAiChat;
pub use loader::FileDocumentLoader;
pub use store::{FileByteStore, InMemoryByteStore};
pub use vector_index::{InMemoryIndexBuilder, InMemoryVectorIndex};
