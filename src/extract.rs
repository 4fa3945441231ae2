//! Text extraction for binary course documents (PDF, DOCX).
//!
//! The loader supplies bytes plus a content type; this module returns plain
//! UTF-8 text. Extraction never panics; failures return an error and the
//! caller decides whether to skip or surface it.

use std::io::Read;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Docx(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Docx(e) => write!(f, "DOCX extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts plain text from binary content.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    text_runs_to_lines(&doc_xml)
}

/// Pull `<w:t>` runs out of document.xml, inserting newlines at paragraph
/// ends so the course header convention survives extraction.
fn text_runs_to_lines(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
