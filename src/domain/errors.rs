use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Load error: {0}")]
    Load(String),

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("Cache I/O error: {0}")]
    CacheIo(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::EmbeddingProvider(msg.into())
    }

    pub fn cache_io(msg: impl Into<String>) -> Self {
        Self::CacheIo(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error aborts only the current question and leaves the
    /// session usable for another one.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Generation(_) | Self::Validation(_) | Self::EmbeddingProvider(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
