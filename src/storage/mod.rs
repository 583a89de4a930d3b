//! Random-access storage used by the archive runtime
//!
//! The archive asks its storage provider for one random-access file per
//! structural log, in two categories: metadata (file tree, signatures,
//! bitfields, keys) and content (the same logs for the content feed, plus
//! the content log itself).

mod file;
mod remote_file;

pub use file::{DirectoryStorage, FileStorage};
pub use remote_file::RemoteFile;

use async_trait::async_trait;
use bytes::Bytes;

use crate::archive::Archive;
use crate::error::Result;

/// Name of the content log inside the content category
pub const CONTENT_LOG: &str = "data";

/// Options the archive passes when opening a storage file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageOptions {
    /// Discard existing content on open
    pub truncate: bool,
    /// Resize to this length on open
    pub size: Option<u64>,
}

/// Byte-addressed file
#[async_trait]
pub trait RandomAccess: Send + Sync {
    /// Read exactly `len` bytes at `offset`
    async fn read(&self, offset: u64, len: u64) -> Result<Bytes>;

    /// Write `data` at `offset`, growing the file as needed
    async fn write(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Shrink or grow to `len` bytes
    async fn truncate(&self, len: u64) -> Result<()>;

    /// Current length in bytes
    async fn size(&self) -> Result<u64>;
}

/// Two-category storage provider consumed by the archive runtime
pub trait StorageProvider: Send + Sync {
    /// Storage for a metadata-category file
    fn metadata(&self, file: &str, opts: &StorageOptions) -> Result<Box<dyn RandomAccess>>;

    /// Storage for a content-category file
    fn content(
        &self,
        file: &str,
        opts: &StorageOptions,
        archive: &dyn Archive,
    ) -> Result<Box<dyn RandomAccess>>;
}
