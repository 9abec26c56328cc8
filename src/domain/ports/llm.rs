use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::{errors::DomainError, PromptContext};

pub type TokenStream = BoxStream<'static, Result<String, DomainError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Opens a token stream for the prompt. Dropping the stream stops the
    /// upstream request.
    async fn stream(&self, prompt: &PromptContext) -> Result<TokenStream, DomainError>;
}
