use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// File formats the loaders know how to turn into plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Docx,
    Pdf,
}

impl DocumentFormat {
    /// Detects the format from a file name's extension, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();

        match ext.as_str() {
            "txt" | "text" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "text",
            Self::Markdown => "markdown",
            Self::Docx => "docx",
            Self::Pdf => "pdf",
        }
    }
}

/// Raw document content as handed over by the user, before any parsing.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn format(&self) -> Option<DocumentFormat> {
        DocumentFormat::from_name(&self.name)
    }
}

/// Plain text extracted from a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedDocument {
    pub id: Uuid,
    pub name: String,
    pub format: DocumentFormat,
    pub text: String,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedDocument {
    pub fn new(name: impl Into<String>, format: DocumentFormat, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            format,
            text: text.into(),
            loaded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub source: String,
    pub content: String,
    /// Byte offset of the chunk's first character in the document text.
    pub offset: usize,
    pub chunk_index: usize,
}

impl DocumentChunk {
    pub fn new(
        document: &LoadedDocument,
        content: impl Into<String>,
        offset: usize,
        chunk_index: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: document.id,
            source: document.name.clone(),
            content: content.into(),
            offset,
            chunk_index,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub score: f32,
}
