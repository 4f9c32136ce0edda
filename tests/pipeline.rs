//! Integration tests for the ingestion pipeline: accepted upload through
//! `ready`/`error`, against the in-memory store and fake embedders.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use ragstack::ingest::UploadError;
use ragstack::models::DocumentStatus;
use ragstack::store::{InMemoryStore, Store};

#[tokio::test]
async fn small_text_file_ends_ready_with_one_chunk() {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let (ingestor, _tmp) = ingestor_with(
        store.clone(),
        Arc::new(FakeEmbedder { dims: DIMS }),
        1000,
        200,
    );

    let fifty_words = "word ".repeat(50);
    let req = upload_request("notes.txt", Some("text/plain"), fifty_words.as_bytes());

    let (doc, bytes) = ingestor.accept_upload(req).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Processing);
    assert!(doc.file_path.as_deref().unwrap().starts_with("co-1/proj-1/"));

    let count = ingestor.process_document(&doc, &bytes).await.unwrap();
    assert_eq!(count, 1);

    let stored = store.get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Ready);
    assert!(stored.error_message.is_none());
    assert_eq!(store.count_chunks(&doc.id).await.unwrap(), 1);
    assert_eq!(stored.content_text.as_deref().unwrap(), fifty_words);
}

#[tokio::test]
async fn detached_upload_reaches_ready_without_the_caller_waiting() {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let (ingestor, _tmp) = ingestor_with(
        store.clone(),
        Arc::new(FakeEmbedder { dims: DIMS }),
        1000,
        200,
    );

    let req = upload_request("notes.txt", Some("text/plain"), b"A short note.");
    let doc = ingestor.clone().upload(req).await.unwrap();
    // The upload response never sees past `processing`.
    assert_eq!(doc.status, DocumentStatus::Processing);

    let mut status = doc.status;
    for _ in 0..100 {
        status = store.get_document(&doc.id).await.unwrap().unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, DocumentStatus::Ready);
}

#[tokio::test]
async fn whitespace_only_file_ends_in_error() {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let (ingestor, _tmp) = ingestor_with(
        store.clone(),
        Arc::new(FakeEmbedder { dims: DIMS }),
        1000,
        200,
    );

    let req = upload_request("blank.txt", Some("text/plain"), b"   \n\n \t \n");
    let (doc, bytes) = ingestor.accept_upload(req).await.unwrap();
    assert!(ingestor.process_document(&doc, &bytes).await.is_err());

    let stored = store.get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Error);
    assert!(stored
        .error_message
        .unwrap()
        .contains("no text content extracted"));
    assert_eq!(store.count_chunks(&doc.id).await.unwrap(), 0);
}

#[tokio::test]
async fn embedding_outage_marks_document_error() {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let (ingestor, _tmp) = ingestor_with(store.clone(), Arc::new(FailingEmbedder), 1000, 200);

    let req = upload_request("notes.txt", Some("text/plain"), b"Some real content here.");
    let (doc, bytes) = ingestor.accept_upload(req).await.unwrap();
    assert!(ingestor.process_document(&doc, &bytes).await.is_err());

    let stored = store.get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Error);
    assert!(stored.error_message.unwrap().contains("503"));
    // No chunk may be visible for a non-ready document.
    assert_eq!(store.count_chunks(&doc.id).await.unwrap(), 0);
    // The preview was persisted before embedding failed.
    assert!(stored.content_text.is_some());
}

#[tokio::test]
async fn chunk_embedding_count_mismatch_is_fatal() {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let (ingestor, _tmp) = ingestor_with(store.clone(), Arc::new(MiscountEmbedder), 1000, 200);

    let req = upload_request("notes.txt", Some("text/plain"), b"Some real content here.");
    let (doc, bytes) = ingestor.accept_upload(req).await.unwrap();
    assert!(ingestor.process_document(&doc, &bytes).await.is_err());

    let stored = store.get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Error);
    assert!(stored
        .error_message
        .unwrap()
        .contains("mismatch between chunks and embeddings"));
}

#[tokio::test]
async fn storage_failure_rolls_back_the_document_row() {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let ingestor = ragstack::ingest::Ingestor::new(
        store.clone(),
        Arc::new(FailingBlobStore),
        Arc::new(FakeEmbedder { dims: DIMS }),
        ragstack::config::ChunkingConfig {
            max_tokens: 1000,
            overlap_tokens: 200,
        },
    );

    let req = upload_request("notes.txt", Some("text/plain"), b"content");
    let err = ingestor.accept_upload(req).await.unwrap_err();
    assert!(matches!(err, UploadError::Storage(_)));

    // No orphaned metadata survives the failed upload.
    assert!(store.list_documents("proj-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn request_shape_violations_create_no_document() {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let (ingestor, _tmp) = ingestor_with(
        store.clone(),
        Arc::new(FakeEmbedder { dims: DIMS }),
        1000,
        200,
    );

    let req = upload_request("cat.png", Some("image/png"), b"\x89PNG");
    assert!(matches!(
        ingestor.clone().upload(req).await.unwrap_err(),
        UploadError::Invalid(_)
    ));
    assert!(store.list_documents("proj-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn multi_chunk_document_has_gapless_ordered_chunks() {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    // Small token budget to force several chunks.
    let (ingestor, _tmp) = ingestor_with(
        store.clone(),
        Arc::new(FakeEmbedder { dims: DIMS }),
        50,
        10,
    );

    let text = (0..20)
        .map(|i| format!("Paragraph number {} talks about topic {}.", i, i))
        .collect::<Vec<_>>()
        .join("\n\n");
    let req = upload_request("long.md", Some("text/markdown"), text.as_bytes());

    let (doc, bytes) = ingestor.accept_upload(req).await.unwrap();
    let count = ingestor.process_document(&doc, &bytes).await.unwrap();
    assert!(count > 1);

    let chunks = store
        .chunks_for_documents(&[doc.id.clone()])
        .await
        .unwrap();
    assert_eq!(chunks.len(), count);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i as i64, "indices must be gapless");
        assert_eq!(chunk.embedding.len(), DIMS);
        // Embedding i corresponds to chunk text i: the fake embedder is
        // content-addressed, so any ordering slip would show here.
        assert_eq!(chunk.embedding, vector_for(&chunk.content, DIMS));
        assert!(chunk.metadata.get("start_index").is_some());
        assert!(chunk.metadata.get("end_index").is_some());
    }
}

#[tokio::test]
async fn oversized_preview_is_truncated() {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let (ingestor, _tmp) = ingestor_with(
        store.clone(),
        Arc::new(FakeEmbedder { dims: DIMS }),
        100_000,
        0,
    );

    let text = "a".repeat(150_000);
    let req = upload_request("big.txt", Some("text/plain"), text.as_bytes());
    let (doc, bytes) = ingestor.accept_upload(req).await.unwrap();
    ingestor.process_document(&doc, &bytes).await.unwrap();

    let stored = store.get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored.content_text.unwrap().len(), 100_000);
}

#[tokio::test]
async fn unknown_type_reaching_extraction_is_defensive_error() {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let (ingestor, _tmp) = ingestor_with(
        store.clone(),
        Arc::new(FakeEmbedder { dims: DIMS }),
        1000,
        200,
    );

    // Slip past validation with an allowed type, then corrupt the row the
    // way a bad migration might, to exercise the defensive branch.
    let req = upload_request("notes.txt", Some("text/plain"), b"hello");
    let (mut doc, bytes) = ingestor.accept_upload(req).await.unwrap();
    doc.file_type = "application/zip".to_string();

    assert!(ingestor.process_document(&doc, &bytes).await.is_err());
    let stored = store.get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Error);
    assert!(stored
        .error_message
        .unwrap()
        .contains("unsupported content-type"));
}

#[tokio::test]
async fn reupload_creates_a_fresh_document() {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let (ingestor, _tmp) = ingestor_with(
        store.clone(),
        Arc::new(FakeEmbedder { dims: DIMS }),
        1000,
        200,
    );

    let (first, bytes) = ingestor
        .accept_upload(upload_request("same.txt", Some("text/plain"), b"same bytes"))
        .await
        .unwrap();
    ingestor.process_document(&first, &bytes).await.unwrap();

    let (second, _) = ingestor
        .accept_upload(upload_request("same.txt", Some("text/plain"), b"same bytes"))
        .await
        .unwrap();

    // Same bytes, no idempotency key: a brand-new document id.
    assert_ne!(first.id, second.id);
    assert_eq!(first.content_hash, second.content_hash);
}
