mod conversation;
mod document;
mod embedding;
mod prompt;

pub use conversation::{Conversation, Message, MessageRole};
pub use document::{Document, DocumentChunk, DocumentFormat, LoadedDocument, SearchResult};
pub use embedding::Embedding;
pub use prompt::{format_context, Answer, PromptContext, PromptTemplate, Provenance};
