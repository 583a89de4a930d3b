//! Local archive access used by the importer
//!
//! The archive keeps its file tree and content log locally. The importer
//! only needs to know whether a logical path exists, how large it is, and
//! how to stream new content into it.

mod memory;

pub use memory::MemoryArchive;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Local entry metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStat {
    pub path: String,
    pub size: u64,
}

/// Streaming writer for one logical path.
///
/// Content becomes visible only after [`BlockSink::finish`] succeeds; a sink
/// dropped earlier must not leave an entry whose size matches the source.
#[async_trait]
pub trait BlockSink: Send {
    /// Append one block
    async fn write(&mut self, block: Bytes) -> Result<()>;

    /// Flush and publish the written content
    async fn finish(self: Box<Self>) -> Result<()>;
}

/// Archive operations the importer depends on.
///
/// Shared across concurrent transfers; calls for distinct paths must be
/// independent.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Whether `path` exists. An `Err` aborts the synchronization pass.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Size metadata of an existing `path`
    async fn stat(&self, path: &str) -> Result<EntryStat>;

    /// Open a writer replacing whatever `path` holds
    async fn create_write_stream(&self, path: &str) -> Result<Box<dyn BlockSink>>;
}
