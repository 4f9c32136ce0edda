//! Document ingestion pipeline.
//!
//! Drives one document from accepted upload to `ready` (or `error`):
//! validate → create row → persist bytes → extract → chunk → embed →
//! persist chunks → flip status. The upload boundary only waits for the
//! synchronous phase (through byte persistence); the rest runs as a
//! detached task whose failure is recorded on the document row, never
//! surfaced to the original caller.
//!
//! Steps are hard gates: the first failure aborts the remainder and the
//! document lands in `error` with the failure message. Raw bytes already
//! in object storage are left in place for inspection.

use std::sync::Arc;

use anyhow::Result;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::blob::{object_path, BlobStore};
use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::embedding::Embedder;
use crate::extract;
use crate::models::{Document, DocumentChunk, DocumentStatus};
use crate::store::Store;

/// Upload size cap.
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
/// Extracted-text preview length stored on the document.
pub const PREVIEW_CHARS: usize = 100_000;
/// Texts per embedding API request.
const EMBED_BATCH_SIZE: usize = 100;
/// Chunk rows per datastore insert, bounding single-request payload size.
const CHUNK_INSERT_BATCH: usize = 50;

/// An upload as received at the boundary.
pub struct UploadRequest {
    pub file_name: String,
    /// MIME type as declared by the client; resolved from the filename
    /// extension when absent.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub project_id: String,
    pub company_id: String,
}

/// Failure during the synchronous upload phase.
#[derive(Debug)]
pub enum UploadError {
    /// Request-shape violation; rejected before any side effect.
    Invalid(String),
    /// Document row could not be created.
    Store(anyhow::Error),
    /// Bytes could not be persisted; the document row was rolled back.
    Storage(anyhow::Error),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Invalid(msg) => f.write_str(msg),
            UploadError::Store(_) => f.write_str("Failed to create document record"),
            UploadError::Storage(_) => f.write_str("Failed to upload file to storage"),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UploadError::Invalid(_) => None,
            UploadError::Store(e) | UploadError::Storage(e) => Some(e.as_ref()),
        }
    }
}

/// Extraction produced nothing usable.
#[derive(Debug)]
pub struct EmptyContentError;

impl std::fmt::Display for EmptyContentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("no text content extracted from document")
    }
}

impl std::error::Error for EmptyContentError {}

/// Chunk and embedding counts diverged; nothing sane can be persisted.
#[derive(Debug)]
pub struct ConsistencyError {
    pub chunks: usize,
    pub embeddings: usize,
}

impl std::fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mismatch between chunks and embeddings: {} chunks, {} embeddings",
            self.chunks, self.embeddings
        )
    }
}

impl std::error::Error for ConsistencyError {}

/// Orchestrates ingestion. Clients are injected; nothing here is global.
pub struct Ingestor {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            embedder,
            chunking,
        }
    }

    /// Shape validation. Returns the resolved MIME type without touching
    /// any external system, so violations cost nothing.
    pub fn validate(req: &UploadRequest) -> Result<String, UploadError> {
        if req.file_name.trim().is_empty()
            || req.bytes.is_empty()
            || req.project_id.trim().is_empty()
            || req.company_id.trim().is_empty()
        {
            return Err(UploadError::Invalid(
                "Missing required fields: file, projectId, companyId".to_string(),
            ));
        }

        let file_type = req
            .content_type
            .as_deref()
            .filter(|ct| !ct.trim().is_empty())
            .map(|ct| ct.to_string())
            .or_else(|| {
                let ext = req.file_name.rsplit('.').next().unwrap_or("");
                extract::mime_from_extension(ext).map(|m| m.to_string())
            })
            .unwrap_or_default();

        if !extract::is_allowed_type(&file_type) {
            return Err(UploadError::Invalid(format!(
                "File type {} is not supported. Please upload PDF, TXT, MD, or CSV files.",
                file_type
            )));
        }

        if req.bytes.len() > MAX_FILE_SIZE {
            return Err(UploadError::Invalid(
                "File size exceeds 10MB limit".to_string(),
            ));
        }

        Ok(file_type)
    }

    /// Synchronous upload phase: validate, create the document row in
    /// `uploading`, persist the bytes, advance to `processing`.
    ///
    /// On storage failure the just-created row is deleted so no orphaned
    /// metadata survives. Returns the document (now `processing`) and the
    /// bytes for the background phase.
    pub async fn accept_upload(
        &self,
        req: UploadRequest,
    ) -> Result<(Document, Vec<u8>), UploadError> {
        let file_type = Self::validate(&req)?;

        // Keep only the final path component of the client-supplied name.
        let file_name = req
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&req.file_name)
            .to_string();

        let now = chrono::Utc::now().timestamp();
        let mut doc = Document {
            id: Uuid::new_v4().to_string(),
            project_id: req.project_id.clone(),
            company_id: req.company_id.clone(),
            name: file_name.clone(),
            file_type,
            file_size: req.bytes.len() as i64,
            file_path: None,
            content_text: None,
            status: DocumentStatus::Uploading,
            error_message: None,
            content_hash: Some(hash_bytes(&req.bytes)),
            created_at: now,
            updated_at: now,
        };

        self.store
            .create_document(&doc)
            .await
            .map_err(UploadError::Store)?;

        let path = object_path(&req.company_id, &req.project_id, &doc.id, &file_name);
        if let Err(e) = self.blobs.put(&path, &req.bytes).await {
            // Roll back the row; a failed upload must not leave metadata.
            if let Err(del) = self.store.delete_document(&doc.id).await {
                tracing::warn!(document_id = %doc.id, error = %del, "rollback delete failed");
            }
            return Err(UploadError::Storage(e));
        }

        self.store
            .set_document_processing(&doc.id, &path)
            .await
            .map_err(UploadError::Store)?;
        doc.status = DocumentStatus::Processing;
        doc.file_path = Some(path);

        Ok((doc, req.bytes))
    }

    /// Full upload boundary: synchronous phase, then the background phase
    /// as a detached task. Returns as soon as the document is `processing`.
    pub async fn upload(self: Arc<Self>, req: UploadRequest) -> Result<Document, UploadError> {
        let (doc, bytes) = self.accept_upload(req).await?;
        self.spawn_processing(doc.clone(), bytes);
        Ok(doc)
    }

    /// Detach the background phase. The task records its own outcome; the
    /// returned handle is dropped deliberately (fire-and-forget relative
    /// to the upload response).
    pub fn spawn_processing(self: Arc<Self>, doc: Document, bytes: Vec<u8>) {
        tokio::spawn(async move {
            let _ = self.process_document(&doc, &bytes).await;
        });
    }

    /// Background phase (extract → chunk → embed → persist → ready).
    /// Any failure is written to the document row as `error` and also
    /// returned, so a synchronous caller (CLI) can report it.
    pub async fn process_document(&self, doc: &Document, bytes: &[u8]) -> Result<usize> {
        match self.process_inner(doc, bytes).await {
            Ok(count) => {
                tracing::info!(document_id = %doc.id, chunks = count, "document processed");
                Ok(count)
            }
            Err(e) => {
                tracing::error!(document_id = %doc.id, error = %e, "document processing failed");
                if let Err(update) = self
                    .store
                    .update_document_status(&doc.id, DocumentStatus::Error, Some(&e.to_string()))
                    .await
                {
                    tracing::error!(document_id = %doc.id, error = %update, "failed to record processing error");
                }
                Err(e)
            }
        }
    }

    async fn process_inner(&self, doc: &Document, bytes: &[u8]) -> Result<usize> {
        let text = extract::extract_text(bytes, &doc.file_type)?;
        if text.trim().is_empty() {
            return Err(EmptyContentError.into());
        }

        // Stored before chunking/embedding so a later failure still leaves
        // something inspectable on the document.
        self.store
            .set_document_preview(&doc.id, preview_of(&text, PREVIEW_CHARS))
            .await?;

        let chunks = chunk_text(&text, self.chunking.max_tokens, self.chunking.overlap_tokens);
        if chunks.is_empty() || chunks.iter().all(|c| c.content.is_empty()) {
            return Err(EmptyContentError.into());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts, EMBED_BATCH_SIZE).await?;
        if embeddings.len() != chunks.len() {
            return Err(ConsistencyError {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            }
            .into());
        }

        let now = chrono::Utc::now().timestamp();
        let rows: Vec<DocumentChunk> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk, embedding))| DocumentChunk {
                id: Uuid::new_v4().to_string(),
                document_id: doc.id.clone(),
                chunk_index: i as i64,
                content: chunk.content.clone(),
                embedding,
                metadata: serde_json::json!({
                    "chunk_index": i,
                    "type": chunk.kind.as_str(),
                    "start_index": chunk.start_index,
                    "end_index": chunk.end_index,
                }),
                created_at: now,
            })
            .collect();

        for batch in rows.chunks(CHUNK_INSERT_BATCH) {
            self.store.insert_chunks(batch).await?;
        }

        self.store
            .update_document_status(&doc.id, DocumentStatus::Ready, None)
            .await?;

        Ok(rows.len())
    }
}

/// First `max_chars` characters, cut on a character boundary.
fn preview_of(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, content_type: Option<&str>, bytes: &[u8]) -> UploadRequest {
        UploadRequest {
            file_name: name.to_string(),
            content_type: content_type.map(|s| s.to_string()),
            bytes: bytes.to_vec(),
            project_id: "proj".to_string(),
            company_id: "co".to_string(),
        }
    }

    #[test]
    fn validate_accepts_known_types() {
        let req = request("notes.txt", Some("text/plain"), b"hello");
        assert_eq!(Ingestor::validate(&req).unwrap(), "text/plain");
    }

    #[test]
    fn validate_resolves_type_from_extension() {
        let req = request("notes.md", None, b"# hi");
        assert_eq!(Ingestor::validate(&req).unwrap(), "text/markdown");
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut req = request("notes.txt", Some("text/plain"), b"hi");
        req.project_id = String::new();
        assert!(matches!(
            Ingestor::validate(&req),
            Err(UploadError::Invalid(_))
        ));

        let empty = request("notes.txt", Some("text/plain"), b"");
        assert!(matches!(
            Ingestor::validate(&empty),
            Err(UploadError::Invalid(_))
        ));
    }

    #[test]
    fn validate_rejects_unknown_type() {
        let req = request("image.png", Some("image/png"), b"\x89PNG");
        let err = Ingestor::validate(&req).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn validate_rejects_oversized_file() {
        let req = request(
            "big.txt",
            Some("text/plain"),
            &vec![b'a'; MAX_FILE_SIZE + 1],
        );
        let err = Ingestor::validate(&req).unwrap_err();
        assert!(err.to_string().contains("10MB"));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let text = "é".repeat(10);
        assert_eq!(preview_of(&text, 3), "ééé");
        assert_eq!(preview_of(&text, 100), text.as_str());
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = hash_bytes(b"hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_bytes(b"hello"));
        assert_ne!(h, hash_bytes(b"world"));
    }
}
