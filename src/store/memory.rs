//! In-memory [`Store`] implementation.
//!
//! Backs tests without a database file. Unlike the SQLite backend it
//! implements the datastore-side nearest-neighbor match, so the search
//! service's primary path gets exercised against it.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Document, DocumentChunk, DocumentStatus, Project};

use super::{ChunkMatch, ProjectStats, Store};

pub struct InMemoryStore {
    projects: RwLock<HashMap<String, Project>>,
    documents: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<DocumentChunk>>,
    chunk_match_enabled: bool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            documents: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
            chunk_match_enabled: true,
        }
    }

    /// A store that reports the nearest-neighbor capability absent, so
    /// callers can drive the in-process fallback path.
    pub fn without_chunk_match() -> Self {
        Self {
            chunk_match_enabled: false,
            ..Self::new()
        }
    }

    /// Chunks sorted by owning document creation time, then chunk index.
    fn ordered_chunks_for(&self, document_ids: &[String]) -> Vec<DocumentChunk> {
        let documents = self.documents.read().unwrap();
        let created_at: HashMap<&str, i64> = document_ids
            .iter()
            .filter_map(|id| documents.get(id.as_str()).map(|d| (id.as_str(), d.created_at)))
            .collect();

        let chunks = self.chunks.read().unwrap();
        let mut out: Vec<DocumentChunk> = chunks
            .iter()
            .filter(|c| created_at.contains_key(c.document_id.as_str()))
            .cloned()
            .collect();
        out.sort_by_key(|c| {
            (
                created_at
                    .get(c.document_id.as_str())
                    .copied()
                    .unwrap_or(i64::MAX),
                c.chunk_index,
            )
        });
        out
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_project(&self, project: &Project) -> Result<()> {
        self.projects
            .write()
            .unwrap()
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.projects.read().unwrap().get(id).cloned())
    }

    async fn list_projects(&self, company_id: &str) -> Result<Vec<Project>> {
        let mut out: Vec<Project> = self
            .projects
            .read()
            .unwrap()
            .values()
            .filter(|p| p.company_id == company_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        let doc_ids: Vec<String> = {
            let documents = self.documents.read().unwrap();
            documents
                .values()
                .filter(|d| d.project_id == id)
                .map(|d| d.id.clone())
                .collect()
        };
        {
            let mut chunks = self.chunks.write().unwrap();
            chunks.retain(|c| !doc_ids.contains(&c.document_id));
        }
        {
            let mut documents = self.documents.write().unwrap();
            documents.retain(|_, d| d.project_id != id);
        }
        self.projects.write().unwrap().remove(id);
        Ok(())
    }

    async fn project_stats(&self, project_id: &str) -> Result<ProjectStats> {
        let documents = self.documents.read().unwrap();
        let mut stats = ProjectStats::default();
        for d in documents.values().filter(|d| d.project_id == project_id) {
            stats.document_count += 1;
            if d.status == DocumentStatus::Ready {
                stats.ready_documents += 1;
            }
        }
        Ok(stats)
    }

    async fn create_document(&self, doc: &Document) -> Result<()> {
        self.documents
            .write()
            .unwrap()
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().unwrap().get(id).cloned())
    }

    async fn list_documents(&self, project_id: &str) -> Result<Vec<Document>> {
        let mut out: Vec<Document> = self
            .documents
            .read()
            .unwrap()
            .values()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        self.chunks.write().unwrap().retain(|c| c.document_id != id);
        self.documents.write().unwrap().remove(id);
        Ok(())
    }

    async fn set_document_processing(&self, id: &str, file_path: &str) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        match documents.get_mut(id) {
            Some(doc) => {
                doc.status = DocumentStatus::Processing;
                doc.file_path = Some(file_path.to_string());
                doc.updated_at = chrono::Utc::now().timestamp();
                Ok(())
            }
            None => bail!("document not found: {}", id),
        }
    }

    async fn set_document_preview(&self, id: &str, preview: &str) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        match documents.get_mut(id) {
            Some(doc) => {
                doc.content_text = Some(preview.to_string());
                doc.updated_at = chrono::Utc::now().timestamp();
                Ok(())
            }
            None => bail!("document not found: {}", id),
        }
    }

    async fn update_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        match documents.get_mut(id) {
            Some(doc) => {
                doc.status = status;
                doc.error_message = error_message.map(|m| m.to_string());
                doc.updated_at = chrono::Utc::now().timestamp();
                Ok(())
            }
            None => bail!("document not found: {}", id),
        }
    }

    async fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        self.chunks.write().unwrap().extend(chunks.iter().cloned());
        Ok(())
    }

    async fn count_chunks(&self, document_id: &str) -> Result<i64> {
        Ok(self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.document_id == document_id)
            .count() as i64)
    }

    async fn ready_document_ids(&self, project_id: &str) -> Result<Vec<String>> {
        let documents = self.documents.read().unwrap();
        let mut ready: Vec<&Document> = documents
            .values()
            .filter(|d| d.project_id == project_id && d.status == DocumentStatus::Ready)
            .collect();
        ready.sort_by_key(|d| d.created_at);
        Ok(ready.iter().map(|d| d.id.clone()).collect())
    }

    async fn chunks_for_documents(&self, document_ids: &[String]) -> Result<Vec<DocumentChunk>> {
        Ok(self.ordered_chunks_for(document_ids))
    }

    async fn document_provenance(&self, document_id: &str) -> Result<Option<(String, String)>> {
        Ok(self
            .documents
            .read()
            .unwrap()
            .get(document_id)
            .map(|d| (d.name.clone(), d.project_id.clone())))
    }

    async fn project_name(&self, project_id: &str) -> Result<Option<String>> {
        Ok(self
            .projects
            .read()
            .unwrap()
            .get(project_id)
            .map(|p| p.name.clone()))
    }

    fn supports_chunk_match(&self) -> bool {
        self.chunk_match_enabled
    }

    async fn match_chunks(
        &self,
        query_embedding: &[f32],
        project_id: &str,
        match_threshold: f32,
        match_count: usize,
    ) -> Result<Vec<ChunkMatch>> {
        let ready = self.ready_document_ids(project_id).await?;
        let candidates = self.ordered_chunks_for(&ready);

        let mut matches = Vec::new();
        for chunk in &candidates {
            let similarity = cosine_similarity(query_embedding, &chunk.embedding)?;
            if similarity >= match_threshold {
                matches.push(ChunkMatch {
                    id: chunk.id.clone(),
                    document_id: chunk.document_id.clone(),
                    content: chunk.content.clone(),
                    chunk_index: chunk.chunk_index,
                    metadata: chunk.metadata.clone(),
                    similarity,
                });
            }
        }
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(match_count);
        Ok(matches)
    }
}
