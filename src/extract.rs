//! Text extraction for uploaded documents.
//!
//! The upload boundary supplies raw bytes plus a MIME type; this module
//! returns plain UTF-8 text. PDF goes through `pdf-extract`; anything under
//! `text/*` is decoded as UTF-8.

/// MIME types accepted at the upload boundary.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_CSV: &str = "text/csv";

const ALLOWED_TYPES: [&str; 4] = [MIME_PDF, MIME_TEXT, MIME_MARKDOWN, MIME_CSV];

/// Extraction error. Never panics; the pipeline records it on the document.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Utf8(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Utf8(e) => write!(f, "text decoding failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Whether this MIME type is accepted at the upload boundary.
pub fn is_allowed_type(content_type: &str) -> bool {
    ALLOWED_TYPES.contains(&content_type)
}

/// MIME type for a filename extension, for uploads that arrive without one.
pub fn mime_from_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => Some(MIME_PDF),
        "txt" => Some(MIME_TEXT),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        "csv" => Some(MIME_CSV),
        _ => None,
    }
}

/// Extracts plain text from uploaded bytes.
///
/// Upload validation already restricts content types, so the unsupported
/// branch is defensive.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    if content_type == MIME_PDF {
        return extract_pdf(bytes);
    }
    if content_type.starts_with("text/") {
        return String::from_utf8(bytes.to_vec()).map_err(|e| ExtractError::Utf8(e.to_string()));
    }
    Err(ExtractError::UnsupportedContentType(
        content_type.to_string(),
    ))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}
