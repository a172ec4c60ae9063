//! Attachment blob storage
//!
//! Trait-based abstraction over wherever attachment bytes end up, so the
//! workflow engine can be tested without touching the file system.
//!
//! # Examples
//!
//! ```rust,no_run
//! use achievement_workflow::external::{BlobStorage, LocalBlobStorage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let blobs: Arc<dyn BlobStorage> = Arc::new(LocalBlobStorage::new("uploads"));
//!     let reference = blobs.store(b"%PDF-1.7".to_vec(), "certificate.pdf").await?;
//!     println!("stored at {reference}");
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepts attachment bytes and returns a storage reference
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn store(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, BlobError>;
}

/// Reject names that could escape the storage directory.
fn checked_file_name(file_name: &str) -> Result<&str, BlobError> {
    let name = file_name.trim();
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');

    if invalid {
        Err(BlobError::InvalidFileName(file_name.to_string()))
    } else {
        Ok(name)
    }
}

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Best-effort MIME type from the file extension.
pub fn guess_content_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("txt") => "text/plain",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Stores blobs as files under a root directory.
///
/// Each stored file gets a unique prefix so identical names never collide.
#[derive(Debug, Clone)]
pub struct LocalBlobStorage {
    root: PathBuf,
}

impl LocalBlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    async fn store(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, BlobError> {
        let name = checked_file_name(file_name)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self
            .root
            .join(format!("{}-{}", uuid::Uuid::new_v4().simple(), name));
        tokio::fs::write(&path, bytes).await?;

        Ok(path.to_string_lossy().into_owned())
    }
}

/// Keeps blobs in memory; references are `memory://<prefix>-<name>`.
#[derive(Debug, Default)]
pub struct InMemoryBlobStorage {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, reference: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(reference).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn store(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, BlobError> {
        let name = checked_file_name(file_name)?;
        let reference = format!("memory://{}-{}", uuid::Uuid::new_v4().simple(), name);
        self.blobs.write().await.insert(reference.clone(), bytes);
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_storage_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path().join("uploads"));

        let reference = storage.store(b"proof".to_vec(), "proof.txt").await.unwrap();

        assert!(reference.ends_with("-proof.txt"));
        assert!(Path::new(&reference).starts_with(storage.root()));
        assert_eq!(tokio::fs::read(&reference).await.unwrap(), b"proof");
    }

    #[tokio::test]
    async fn test_same_name_twice_gives_distinct_references() {
        let storage = InMemoryBlobStorage::new();

        let first = storage.store(vec![1], "scan.png").await.unwrap();
        let second = storage.store(vec![2], "scan.png").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(storage.get(&second).await, Some(vec![2]));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("cert.PDF"), "application/pdf");
        assert_eq!(guess_content_type("photo.jpeg"), "image/jpeg");
        assert_eq!(guess_content_type("archive"), DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path());

        for name in ["../etc/passwd", "a/b.txt", "..", "  "] {
            assert!(matches!(
                storage.store(vec![0], name).await,
                Err(BlobError::InvalidFileName(_))
            ));
        }
    }
}
