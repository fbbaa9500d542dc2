//! Object storage for report files.
//!
//! The sync layer stores uploaded reports as opaque blobs at paths like
//! `reports/{epoch-millis}-{filename}` and keeps the returned durable URL
//! in the document metadata. [`FsBlobStore`] implements the contract on
//! the local filesystem.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info};

use crate::error::BlobError;

/// Object storage: binary blobs addressed by path, fetched by URL.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store a blob and return a durable fetch URL for it.
    async fn put(&self, path: &str, data: Bytes) -> Result<String, BlobError>;

    /// Delete the blob at a previously-returned storage path.
    async fn delete(&self, path: &str) -> Result<(), BlobError>;

    /// Whether a blob exists at the given path.
    async fn exists(&self, path: &str) -> bool;
}

/// Filesystem-backed blob store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    pub async fn new(base_path: PathBuf) -> Result<Self, BlobError> {
        fs::create_dir_all(&base_path).await?;
        info!(path = %base_path.display(), "blob store initialized");
        Ok(Self { base_path })
    }

    /// Resolve a storage path under the base directory, rejecting
    /// anything that could escape it.
    fn safe_path(&self, path: &str) -> Result<PathBuf, BlobError> {
        if path.is_empty() {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        let relative = Path::new(path);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(BlobError::InvalidPath(path.to_string())),
            }
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl BlobStorage for FsBlobStore {
    async fn put(&self, path: &str, data: Bytes) -> Result<String, BlobError> {
        let full = self.safe_path(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, &data).await?;

        debug!(path, size = data.len(), "blob stored");
        Ok(format!("file://{}", full.display()))
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let full = self.safe_path(path)?;
        if !full.exists() {
            return Err(BlobError::NotFound(path.to_string()));
        }
        fs::remove_file(&full).await?;
        debug!(path, "blob deleted");
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        match self.safe_path(path) {
            Ok(full) => full.exists(),
            Err(_) => false,
        }
    }
}
