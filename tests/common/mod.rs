//! Shared fixtures: deterministic fake embedders and pipeline assembly.
#![allow(dead_code)] // each test binary uses its own subset

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use ragstack::blob::{BlobStore, FsBlobStore};
use ragstack::config::ChunkingConfig;
use ragstack::embedding::{EmbedError, Embedder};
use ragstack::ingest::{Ingestor, UploadRequest};
use ragstack::models::{Document, DocumentChunk, DocumentStatus, Project};
use ragstack::store::Store;

pub const DIMS: usize = 8;

/// Deterministic embedding derived from the text's hash. Same text, same
/// vector, across runs and batch sizes.
pub fn vector_for(text: &str, dims: usize) -> Vec<f32> {
    let hash = Sha256::digest(text.as_bytes());
    (0..dims)
        .map(|i| (f32::from(hash[i % 32]) / 255.0) - 0.5)
        .collect()
}

/// Hash-based fake embedder; stands in for the external API.
pub struct FakeEmbedder {
    pub dims: usize,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embedder"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(vector_for(text, self.dims))
    }
    async fn embed_batch(
        &self,
        texts: &[String],
        _batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| vector_for(t, self.dims)).collect())
    }
}

/// Embedder that always returns one fixed vector. Lets search tests pick
/// the query direction precisely.
pub struct StaticEmbedder(pub Vec<f32>);

#[async_trait]
impl Embedder for StaticEmbedder {
    fn model_name(&self) -> &str {
        "static-embedder"
    }
    fn dims(&self) -> usize {
        self.0.len()
    }
    async fn embed_one(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.0.clone())
    }
    async fn embed_batch(
        &self,
        texts: &[String],
        _batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(vec![self.0.clone(); texts.len()])
    }
}

/// Embedder whose batch endpoint always fails with a retryable upstream
/// error, as a rate-limited or down API would.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-embedder"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_one(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Upstream {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }
    async fn embed_batch(
        &self,
        _texts: &[String],
        _batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Upstream {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }
}

/// Embedder that drops the last vector of every batch, violating the
/// order/length contract.
pub struct MiscountEmbedder;

#[async_trait]
impl Embedder for MiscountEmbedder {
    fn model_name(&self) -> &str {
        "miscount-embedder"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(vector_for(text, DIMS))
    }
    async fn embed_batch(
        &self,
        texts: &[String],
        _batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out: Vec<Vec<f32>> = texts.iter().map(|t| vector_for(t, DIMS)).collect();
        out.pop();
        Ok(out)
    }
}

/// Blob store that refuses every put, simulating a storage outage.
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, path: &str, _bytes: &[u8]) -> anyhow::Result<()> {
        anyhow::bail!("storage unavailable: {}", path)
    }
    async fn delete(&self, _path: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Assemble an ingestor over the given store and embedder, with blobs on a
/// temp directory. The `TempDir` must outlive the ingestor.
pub fn ingestor_with(
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    max_tokens: usize,
    overlap_tokens: usize,
) -> (Arc<Ingestor>, tempfile::TempDir) {
    let tmp = tempfile::TempDir::new().unwrap();
    let blobs = Arc::new(FsBlobStore::new(tmp.path()));
    let ingestor = Arc::new(Ingestor::new(
        store,
        blobs,
        embedder,
        ChunkingConfig {
            max_tokens,
            overlap_tokens,
        },
    ));
    (ingestor, tmp)
}

pub fn upload_request(name: &str, content_type: Option<&str>, bytes: &[u8]) -> UploadRequest {
    UploadRequest {
        file_name: name.to_string(),
        content_type: content_type.map(|s| s.to_string()),
        bytes: bytes.to_vec(),
        project_id: "proj-1".to_string(),
        company_id: "co-1".to_string(),
    }
}

pub async fn seed_project(store: &dyn Store, id: &str, company_id: &str, name: &str) -> Project {
    let now = chrono::Utc::now().timestamp();
    let project = Project {
        id: id.to_string(),
        company_id: company_id.to_string(),
        name: name.to_string(),
        description: None,
        created_at: now,
        updated_at: now,
    };
    store.create_project(&project).await.unwrap();
    project
}

/// Insert a ready document with one pre-embedded chunk per `(content,
/// vector)` pair, bypassing the pipeline.
pub async fn seed_ready_document(
    store: &dyn Store,
    project_id: &str,
    name: &str,
    created_at: i64,
    chunks: &[(&str, Vec<f32>)],
) -> Document {
    let doc = Document {
        id: Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        company_id: "co-1".to_string(),
        name: name.to_string(),
        file_type: "text/plain".to_string(),
        file_size: 1,
        file_path: None,
        content_text: None,
        status: DocumentStatus::Ready,
        error_message: None,
        content_hash: None,
        created_at,
        updated_at: created_at,
    };
    store.create_document(&doc).await.unwrap();

    let rows: Vec<DocumentChunk> = chunks
        .iter()
        .enumerate()
        .map(|(i, (content, vector))| DocumentChunk {
            id: Uuid::new_v4().to_string(),
            document_id: doc.id.clone(),
            chunk_index: i as i64,
            content: content.to_string(),
            embedding: vector.clone(),
            metadata: serde_json::json!({ "chunk_index": i }),
            created_at,
        })
        .collect();
    store.insert_chunks(&rows).await.unwrap();
    doc
}
