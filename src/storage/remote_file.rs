//! Read-only random access to one remote object

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::RandomAccess;
use crate::error::{HybridError, Result};
use crate::remote::RemoteStore;

/// Serves reads of a single object with ranged requests
pub struct RemoteFile {
    remote: Arc<dyn RemoteStore>,
    key: String,
}

impl RemoteFile {
    pub fn new(remote: Arc<dyn RemoteStore>, key: impl Into<String>) -> Self {
        Self {
            remote,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl RandomAccess for RemoteFile {
    async fn read(&self, offset: u64, len: u64) -> Result<Bytes> {
        tracing::trace!("Range read {} +{} of {}", offset, len, self.key);
        self.remote.read_range(&self.key, offset, len).await
    }

    async fn write(&self, _offset: u64, _data: &[u8]) -> Result<()> {
        Err(HybridError::ReadOnly(self.key.clone()))
    }

    async fn truncate(&self, _len: u64) -> Result<()> {
        Err(HybridError::ReadOnly(self.key.clone()))
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.remote.stat(&self.key).await?.size)
    }
}
