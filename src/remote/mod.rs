//! Remote object store access
//!
//! The importer and the remote-backed content reader only need four
//! operations from the object store: list keys under a prefix, stat a key,
//! stream a whole object and read a byte range. [`RemoteStore`] captures
//! exactly those so the engine can run against S3 or an in-process store.

mod memory;
#[cfg(feature = "cloud")]
mod s3;

pub use memory::MemoryRemote;
#[cfg(feature = "cloud")]
pub use s3::S3Remote;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::Result;

/// A boxed stream of bytes read from the object store
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Remote object metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl ObjectStat {
    pub fn with_size(size: u64) -> Self {
        Self {
            size,
            etag: None,
            last_modified: None,
        }
    }
}

/// Object store operations used by the importer and the content reader.
///
/// Implementations are shared across concurrent transfers and must
/// tolerate concurrent calls.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List every object key starting with `prefix`, relative to it.
    ///
    /// Directory markers (keys ending in `/`) are omitted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Size metadata for an absolute key
    async fn stat(&self, key: &str) -> Result<ObjectStat>;

    /// Open a streaming reader for an absolute key.
    ///
    /// Opening never fails; errors surface while the stream is read.
    fn open_read(&self, key: &str) -> ByteStream;

    /// Read `len` bytes at `offset` of an absolute key
    async fn read_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes>;
}

/// Strip `prefix` from a listed key, dropping the prefix itself and markers
pub(crate) fn relative_key(prefix: &str, key: &str) -> Option<String> {
    let rel = key.strip_prefix(prefix)?;
    let rel = rel.trim_start_matches('/');
    if rel.is_empty() || rel.ends_with('/') {
        None
    } else {
        Some(rel.to_string())
    }
}
