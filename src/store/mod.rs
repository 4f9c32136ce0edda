//! Datastore abstraction for ragstack.
//!
//! The [`Store`] trait covers every persistence operation the ingestion
//! pipeline, search service, and HTTP layer need, enabling pluggable
//! backends. [`SqliteStore`] is the shipping backend; [`InMemoryStore`]
//! backs tests and exercises the datastore-side vector match path that
//! plain SQLite cannot provide.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Document, DocumentChunk, DocumentStatus, Project};

/// A chunk row returned by the datastore-side nearest-neighbor function,
/// pre-filtered to ready documents in-project and pre-sorted by similarity
/// descending.
#[derive(Debug, Clone)]
pub struct ChunkMatch {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub chunk_index: i64,
    pub metadata: serde_json::Value,
    pub similarity: f32,
}

/// Per-project document counts, for the project listing surface.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ProjectStats {
    pub document_count: i64,
    pub ready_documents: i64,
}

/// Abstract storage backend.
///
/// Implementations must be `Send + Sync`; every operation is async.
#[async_trait]
pub trait Store: Send + Sync {
    // ---- projects ----

    async fn create_project(&self, project: &Project) -> Result<()>;
    async fn get_project(&self, id: &str) -> Result<Option<Project>>;
    async fn list_projects(&self, company_id: &str) -> Result<Vec<Project>>;

    /// Delete a project and cascade to its documents and chunks.
    /// Stored bytes are the caller's responsibility (the store does not
    /// reach into object storage).
    async fn delete_project(&self, id: &str) -> Result<()>;

    async fn project_stats(&self, project_id: &str) -> Result<ProjectStats>;

    // ---- documents ----

    async fn create_document(&self, doc: &Document) -> Result<()>;
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;
    async fn list_documents(&self, project_id: &str) -> Result<Vec<Document>>;

    /// Delete a document and cascade to its chunks.
    async fn delete_document(&self, id: &str) -> Result<()>;

    /// Record the storage path and advance to `processing`.
    async fn set_document_processing(&self, id: &str, file_path: &str) -> Result<()>;

    /// Persist the extracted-text preview.
    async fn set_document_preview(&self, id: &str, preview: &str) -> Result<()>;

    /// Unconditional status write (last-writer-wins by design).
    async fn update_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    // ---- chunks ----

    async fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<()>;
    async fn count_chunks(&self, document_id: &str) -> Result<i64>;

    // ---- search support ----

    /// Ids of `ready` documents in a project.
    async fn ready_document_ids(&self, project_id: &str) -> Result<Vec<String>>;

    /// All chunks belonging to the given documents, ordered by document
    /// creation time then chunk index.
    async fn chunks_for_documents(&self, document_ids: &[String]) -> Result<Vec<DocumentChunk>>;

    /// Document name and owning project id, for search provenance.
    async fn document_provenance(&self, document_id: &str) -> Result<Option<(String, String)>>;

    async fn project_name(&self, project_id: &str) -> Result<Option<String>>;

    /// Whether this backend offers a datastore-side nearest-neighbor
    /// function. Probed once per search; when absent, the search service
    /// runs its in-process fallback instead.
    fn supports_chunk_match(&self) -> bool {
        false
    }

    /// Datastore-side nearest-neighbor match. Only called when
    /// [`supports_chunk_match`](Store::supports_chunk_match) is true.
    async fn match_chunks(
        &self,
        _query_embedding: &[f32],
        _project_id: &str,
        _match_threshold: f32,
        _match_count: usize,
    ) -> Result<Vec<ChunkMatch>> {
        bail!("datastore-side vector match is not supported by this backend");
    }
}
