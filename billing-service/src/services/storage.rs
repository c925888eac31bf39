//! Document storage and text extraction collaborators.

use async_trait::async_trait;
use billing_core::error::AppError;
use std::path::PathBuf;
use tokio::fs;

/// Narrow contract the core uses for specification documents and scanned
/// invoices. Implementations own pathing and durability.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist bytes under a key and return the stored reference.
    async fn save(&self, key: &str, data: Vec<u8>) -> Result<String, AppError>;
    async fn open(&self, reference: &str) -> Result<Vec<u8>, AppError>;
    async fn exists(&self, reference: &str) -> Result<bool, AppError>;
}

/// Filesystem-backed document store.
pub struct LocalDocumentStore {
    base_path: PathBuf,
}

impl LocalDocumentStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn save(&self, key: &str, data: Vec<u8>) -> Result<String, AppError> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        Ok(key.to_string())
    }

    async fn open(&self, reference: &str) -> Result<Vec<u8>, AppError> {
        let path = self.base_path.join(reference);
        if !path.exists() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Document '{}' not found",
                reference
            )));
        }
        let data = fs::read(path).await?;
        Ok(data)
    }

    async fn exists(&self, reference: &str) -> Result<bool, AppError> {
        Ok(self.base_path.join(reference).exists())
    }
}

/// Stand-in for the OCR engine: turns document bytes into text. The real
/// extractor lives outside this service; the plain implementation treats
/// the payload as UTF-8, which is what the test fixtures use.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, data: &[u8]) -> Result<String, AppError>;
}

pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, data: &[u8]) -> Result<String, AppError> {
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}
