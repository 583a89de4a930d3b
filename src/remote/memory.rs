//! In-memory object store
//!
//! Useful for tests and for embedding the importer without a network.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, TryStreamExt};
use parking_lot::RwLock;

use super::{relative_key, ByteStream, ObjectStat, RemoteStore};
use crate::error::{HybridError, Result};

/// Size of the pieces `open_read` yields, small enough to exercise re-chunking
const DEFAULT_PIECE_SIZE: usize = 16 * 1024;

/// Object store kept in a sorted in-process map
#[derive(Clone)]
pub struct MemoryRemote {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
    piece_size: usize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            piece_size: DEFAULT_PIECE_SIZE,
        }
    }

    /// Yield object bodies in pieces of `piece_size` bytes
    pub fn with_piece_size(mut self, piece_size: usize) -> Self {
        self.piece_size = piece_size.max(1);
        self
    }

    /// Store (or replace) an object
    pub fn put(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.write().insert(key.into(), data.into());
    }

    /// Remove an object, returning whether it existed
    pub fn remove(&self, key: &str) -> bool {
        self.objects.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn get(&self, key: &str) -> Result<Bytes> {
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| HybridError::ObjectNotFound(key.to_string()))
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read();
        Ok(objects
            .keys()
            .filter_map(|key| relative_key(prefix, key))
            .collect())
    }

    async fn stat(&self, key: &str) -> Result<ObjectStat> {
        self.get(key).map(|data| ObjectStat::with_size(data.len() as u64))
    }

    fn open_read(&self, key: &str) -> ByteStream {
        let this = self.clone();
        let key = key.to_string();
        let body = async move {
            let data = this.get(&key)?;
            let pieces: Vec<Result<Bytes>> = (0..data.len())
                .step_by(this.piece_size)
                .map(|start| Ok(data.slice(start..(start + this.piece_size).min(data.len()))))
                .collect();
            Ok::<_, HybridError>(stream::iter(pieces))
        };
        Box::pin(stream::once(body).try_flatten())
    }

    async fn read_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes> {
        let data = self.get(key)?;
        let size = data.len() as u64;
        let end = offset.checked_add(len).filter(|end| *end <= size).ok_or(
            HybridError::OutOfBounds { offset, len, size },
        )?;
        Ok(data.slice(offset as usize..end as usize))
    }
}
