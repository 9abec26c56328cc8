mod file;

pub use file::{docx_xml_to_text, FileDocumentLoader};
