//! Core data models used throughout ragstack.
//!
//! These types represent the projects, documents, and chunks that flow
//! through the ingestion pipeline, plus the transient search result
//! projection returned to query consumers.

use serde::Serialize;

/// Lifecycle state of a document. Progression is strictly forward:
/// `Uploading → Processing → {Ready, Error}`. Only the ingestion pipeline
/// advances status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Uploading,
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploading => "uploading",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploading" => Some(DocumentStatus::Uploading),
            "processing" => Some(DocumentStatus::Processing),
            "ready" => Some(DocumentStatus::Ready),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }

    /// `Ready` and `Error` are terminal; nothing advances past them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Ready | DocumentStatus::Error)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant-scoped project. Owns zero or more documents; deletion cascades
/// to documents, chunks, and stored bytes.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An uploaded document tracked through the ingestion pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub company_id: String,
    pub name: String,
    pub file_type: String,
    pub file_size: i64,
    /// Object-storage path, recorded when bytes are persisted.
    pub file_path: Option<String>,
    /// First ~100k characters of extracted text, kept for display.
    pub content_text: Option<String>,
    #[serde(serialize_with = "serialize_status")]
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    /// SHA-256 of the raw bytes, recorded for inspection. Not an
    /// idempotency key: re-uploading the same bytes creates a new document.
    pub content_hash: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn serialize_status<S: serde::Serializer>(
    status: &DocumentStatus,
    ser: S,
) -> Result<S::Ok, S::Error> {
    ser.serialize_str(status.as_str())
}

/// An embedded segment of a document's extracted text. Immutable after
/// creation; deleted only by cascade from its document.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    /// Zero-based, gapless within a document.
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Carries at minimum `start_index`/`end_index` source offsets.
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

/// Query-time projection joining a matched chunk with its provenance.
/// Constructed fresh per search, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RagContext {
    pub chunk_id: String,
    pub document_id: String,
    pub document_name: String,
    pub project_id: String,
    pub project_name: String,
    pub content: String,
    pub chunk_index: i64,
    pub metadata: serde_json::Value,
    pub similarity: f32,
}
