//! Object store port consumed by the render pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("invalid object key `{key}`")]
    InvalidKey { key: String },
    #[error("object store request failed: {message}")]
    Transport { message: String },
}

impl StoreError {
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Fetch-by-key access to stored score documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the full object into memory.
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError>;
}
