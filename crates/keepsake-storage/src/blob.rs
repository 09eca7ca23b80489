//! Content-envelope blobs keyed `{userId}/{itemId}/{version}`.
//!
//! The store sees only ciphertext. It never parses what it holds.

use keepsake_core::types::blob_key;
use opendal::Operator;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {key}")]
    NotFound { key: String },

    #[error("storage backend: {0}")]
    Backend(#[from] opendal::Error),
}

pub type BlobResult<T> = Result<T, BlobError>;

#[derive(Debug, Clone)]
pub struct BlobStore {
    op: Operator,
}

impl BlobStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    /// Check the backend is reachable by listing the root. Never touches blob contents.
    pub async fn check_health(&self) -> BlobResult<()> {
        self.op.list("/").await?;
        Ok(())
    }

    pub async fn is_healthy(&self) -> bool {
        match self.check_health().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("storage health check failed: {e}");
                false
            }
        }
    }

    /// Store an envelope for one item version. Returns the blob key.
    pub async fn put(
        &self,
        user_id: &str,
        item_id: &str,
        version: u32,
        envelope: Vec<u8>,
    ) -> BlobResult<String> {
        let key = blob_key(user_id, item_id, version);
        let len = envelope.len();
        self.op.write(&key, envelope).await?;
        tracing::debug!(key = %key, bytes = len, "stored blob");
        Ok(key)
    }

    /// Fetch by blob key (the `r2Key` of an item).
    pub async fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        match self.op.read(key).await {
            Ok(buf) => Ok(buf.to_vec()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Err(BlobError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, key: &str) -> BlobResult<bool> {
        match self.op.stat(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a blob. Deleting a missing key succeeds.
    pub async fn delete(&self, key: &str) -> BlobResult<()> {
        self.op.delete(key).await?;
        tracing::debug!(key = %key, "deleted blob");
        Ok(())
    }
}
