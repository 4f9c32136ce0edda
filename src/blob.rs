//! Durable storage for uploaded document bytes.
//!
//! Paths are relative, namespaced as
//! `{company_id}/{project_id}/{document_id}/{file_name}`. A put against an
//! existing path fails rather than silently replacing the object.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Object storage the ingestion pipeline persists raw uploads into.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes at `path`. Fails if the path already exists.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Remove the object at `path`. Missing objects are not an error.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Builds the canonical storage path for a document's bytes.
pub fn object_path(company_id: &str, project_id: &str, document_id: &str, file_name: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        company_id, project_id, document_id, file_name
    )
}

/// Filesystem-backed [`BlobStore`] rooted at a configured directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        if rel.is_absolute() {
            bail!("storage path must be relative: {}", path);
        }
        for component in rel.components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => bail!("storage path contains invalid component: {}", path),
            }
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create storage directory for {}", path))?;
        }

        // create_new refuses to clobber an existing object.
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
            .with_context(|| format!("Failed to create storage object {}", path))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("Failed to write storage object {}", path))?;
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete storage object {}", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_is_tenant_namespaced() {
        assert_eq!(
            object_path("co", "proj", "doc", "report.pdf"),
            "co/proj/doc/report.pdf"
        );
    }

    #[tokio::test]
    async fn put_then_delete_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path());

        store.put("co/p/d/file.txt", b"hello").await.unwrap();
        let on_disk = tmp.path().join("co/p/d/file.txt");
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"hello");

        store.delete("co/p/d/file.txt").await.unwrap();
        assert!(!on_disk.exists());
    }

    #[tokio::test]
    async fn put_refuses_to_overwrite() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path());

        store.put("co/p/d/file.txt", b"first").await.unwrap();
        assert!(store.put("co/p/d/file.txt", b"second").await.is_err());
        assert_eq!(
            std::fs::read(tmp.path().join("co/p/d/file.txt")).unwrap(),
            b"first"
        );
    }

    #[tokio::test]
    async fn delete_missing_object_is_ok() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path());
        store.delete("co/p/d/never-there.txt").await.unwrap();
    }

    #[tokio::test]
    async fn traversal_components_are_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path());
        assert!(store.put("co/../../etc/passwd", b"x").await.is_err());
        assert!(store.put("/absolute/path", b"x").await.is_err());
    }
}
