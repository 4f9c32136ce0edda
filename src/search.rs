//! Similarity search over a project's ready document chunks.
//!
//! The query string is embedded, then matched against stored chunk vectors
//! one of two ways: the datastore-side nearest-neighbor function when the
//! backend offers one (probed explicitly, not discovered via errors), or an
//! in-process cosine scan as the degrade-gracefully fallback. Both paths
//! filter to the similarity threshold and return the same shape.
//!
//! Each match is joined with its document and project names for
//! provenance; a failed lookup degrades that entry to `"Unknown"` rather
//! than failing the search. An empty result set is success.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::RagContext;
use crate::store::{ChunkMatch, Store};

/// Sentinel for provenance that could not be resolved.
const UNKNOWN: &str = "Unknown";

pub struct SearchService {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    match_threshold: f32,
}

impl SearchService {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn Embedder>, match_threshold: f32) -> Self {
        Self {
            store,
            embedder,
            match_threshold,
        }
    }

    /// Top-`limit` chunks from the project's ready documents with
    /// similarity ≥ threshold, highest first.
    pub async fn search(
        &self,
        query: &str,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<RagContext>> {
        if query.trim().is_empty() || project_id.trim().is_empty() {
            bail!("Missing required fields: query, projectId");
        }

        // Single embed, no retry wrapper: a transient failure surfaces
        // directly to the caller.
        let query_vec = self.embedder.embed_one(query).await?;

        let matches = if self.store.supports_chunk_match() {
            self.store
                .match_chunks(&query_vec, project_id, self.match_threshold, limit)
                .await?
        } else {
            self.scan_in_process(&query_vec, project_id, limit).await?
        };

        let mut results = Vec::with_capacity(matches.len());
        for m in matches {
            results.push(self.with_provenance(m).await);
        }
        Ok(results)
    }

    /// Fallback path: load every chunk of every ready document in the
    /// project and rank in-process. Chunks arrive ordered by document
    /// creation time then chunk index, and the sort is stable, so exact
    /// similarity ties keep that order.
    async fn scan_in_process(
        &self,
        query_vec: &[f32],
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>> {
        let ready = self.store.ready_document_ids(project_id).await?;
        if ready.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.store.chunks_for_documents(&ready).await?;
        let mut matches = Vec::new();
        for chunk in chunks {
            let similarity = cosine_similarity(query_vec, &chunk.embedding)?;
            if similarity >= self.match_threshold {
                matches.push(ChunkMatch {
                    id: chunk.id,
                    document_id: chunk.document_id,
                    content: chunk.content,
                    chunk_index: chunk.chunk_index,
                    metadata: chunk.metadata,
                    similarity,
                });
            }
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    /// Resolve document and project names for one match. Lookup failures
    /// degrade to the `"Unknown"` sentinel instead of aborting the search.
    async fn with_provenance(&self, m: ChunkMatch) -> RagContext {
        let (document_name, owner_project_id) =
            match self.store.document_provenance(&m.document_id).await {
                Ok(Some((name, project_id))) => (name, project_id),
                Ok(None) => (UNKNOWN.to_string(), String::new()),
                Err(e) => {
                    tracing::warn!(document_id = %m.document_id, error = %e, "provenance lookup failed");
                    (UNKNOWN.to_string(), String::new())
                }
            };

        let project_name = if owner_project_id.is_empty() {
            UNKNOWN.to_string()
        } else {
            match self.store.project_name(&owner_project_id).await {
                Ok(Some(name)) => name,
                Ok(None) => UNKNOWN.to_string(),
                Err(e) => {
                    tracing::warn!(project_id = %owner_project_id, error = %e, "project lookup failed");
                    UNKNOWN.to_string()
                }
            }
        };

        RagContext {
            chunk_id: m.id,
            document_id: m.document_id,
            document_name,
            project_id: owner_project_id,
            project_name,
            content: m.content,
            chunk_index: m.chunk_index,
            metadata: m.metadata,
            similarity: m.similarity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbedError;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;

    struct StaticEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for StaticEmbedder {
        fn model_name(&self) -> &str {
            "static"
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

    #[tokio::test]
    async fn blank_inputs_are_rejected() {
        let service = SearchService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(StaticEmbedder(vec![1.0, 0.0])),
            0.7,
        );
        assert!(service.search("", "proj", 5).await.is_err());
        assert!(service.search("query", "  ", 5).await.is_err());
    }

    #[tokio::test]
    async fn empty_project_returns_success_with_no_results() {
        let service = SearchService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(StaticEmbedder(vec![1.0, 0.0])),
            0.7,
        );
        let results = service.search("anything", "proj", 5).await.unwrap();
        assert!(results.is_empty());
    }
}
