use async_trait::async_trait;
use regex::Regex;
use std::io::{Cursor, Read};
use std::sync::LazyLock;
use tracing::instrument;

use crate::domain::{ports::DocumentLoader, Document, DocumentFormat, DomainError, LoadedDocument};

static PARAGRAPH_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</w:p>|<w:br\s*/>|<w:cr\s*/>").expect("valid regex"));
static TAB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<w:tab\s*/>").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Extracts text from plain-text, Markdown, Word (`.docx`) and PDF files,
/// choosing by file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDocumentLoader;

impl FileDocumentLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentLoader for FileDocumentLoader {
    #[instrument(skip(self, document), fields(name = %document.name, bytes = document.bytes.len()))]
    async fn load(&self, document: &Document) -> Result<LoadedDocument, DomainError> {
        let format = document.format().ok_or_else(|| {
            DomainError::load(format!(
                "{}: unsupported file type (expected .txt, .md, .docx or .pdf)",
                document.name
            ))
        })?;

        let text = match format {
            DocumentFormat::PlainText | DocumentFormat::Markdown => decode_text(&document.bytes),
            DocumentFormat::Docx => extract_docx(&document.bytes)
                .map_err(|e| DomainError::load(format!("{}: {e}", document.name)))?,
            DocumentFormat::Pdf => {
                let bytes = document.bytes.clone();
                tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                    .await
                    .map_err(|e| DomainError::load(format!("{}: {e}", document.name)))?
                    .map_err(|e| DomainError::load(format!("{}: {e}", document.name)))?
            }
        };

        Ok(LoadedDocument::new(&document.name, format, text))
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| format!("not a Word document: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;

    Ok(docx_xml_to_text(&xml))
}

/// Paragraphs and breaks become newlines; all other markup is dropped.
pub fn docx_xml_to_text(xml: &str) -> String {
    let text = PARAGRAPH_END.replace_all(xml, "\n");
    let text = TAB.replace_all(&text, "\t");
    let text = TAG.replace_all(&text, "");
    unescape_xml(text.trim())
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx(body: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer
            .write_all(
                format!(r#"<?xml version="1.0"?><w:document><w:body>{body}</w:body></w:document>"#)
                    .as_bytes(),
            )
            .unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_load_plain_text() {
        let doc = Document::new("notes.txt", "\u{feff}line one\nline two".as_bytes());
        let loaded = FileDocumentLoader.load(&doc).await.unwrap();

        assert_eq!(loaded.text, "line one\nline two");
        assert_eq!(loaded.format, DocumentFormat::PlainText);
        assert_eq!(loaded.name, "notes.txt");
    }

    #[tokio::test]
    async fn test_load_docx_paragraphs() {
        let body = "<w:p><w:r><w:t>Acute stroke</w:t></w:r></w:p>\
                    <w:p><w:r><w:t>Call &amp; wait</w:t><w:tab/><w:t>now</w:t></w:r></w:p>";
        let doc = Document::new("guide.docx", docx(body));

        let loaded = FileDocumentLoader.load(&doc).await.unwrap();

        assert_eq!(loaded.text, "Acute stroke\nCall & wait\tnow");
    }

    #[tokio::test]
    async fn test_docx_without_body_is_load_error() {
        let doc = Document::new("broken.docx", b"PK not really".to_vec());
        let err = FileDocumentLoader.load(&doc).await.unwrap_err();
        assert!(matches!(err, DomainError::Load(_)));
    }

    #[tokio::test]
    async fn test_invalid_pdf_is_load_error() {
        let doc = Document::new("scan.pdf", b"definitely not a pdf".to_vec());
        let err = FileDocumentLoader.load(&doc).await.unwrap_err();
        assert!(err.to_string().contains("scan.pdf"));
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let doc = Document::new("image.png", vec![0x89, b'P', b'N', b'G']);
        let err = FileDocumentLoader.load(&doc).await.unwrap_err();
        assert!(matches!(err, DomainError::Load(_)));
    }

    #[test]
    fn test_entities_are_unescaped_once() {
        assert_eq!(docx_xml_to_text("<w:t>&amp;lt;</w:t>"), "&lt;");
    }
}
