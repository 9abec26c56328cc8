use crate::domain::{errors::DomainError, Document, LoadedDocument};
use async_trait::async_trait;

/// Turns raw document bytes into plain text.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, document: &Document) -> Result<LoadedDocument, DomainError>;
}
