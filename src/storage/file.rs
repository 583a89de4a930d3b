//! Local directory storage provider
//!
//! Lays files out as `<dir>/.dat/metadata.<name>` and
//! `<dir>/.dat/content.<name>`. Files are opened lazily on first access.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, OnceCell};

use super::{RandomAccess, StorageOptions, StorageProvider};
use crate::archive::Archive;
use crate::error::{HybridError, Result};

const STORAGE_DIR: &str = ".dat";

/// Storage provider rooted at a local directory
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    pub fn new(local_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: local_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path backing `<category>.<file>`
    pub fn file_path(&self, category: &str, file: &str) -> Result<PathBuf> {
        if file.is_empty() || file.contains(['/', '\\']) || file == "." || file == ".." {
            return Err(HybridError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid storage file name: {:?}", file),
            )));
        }
        Ok(self
            .root
            .join(STORAGE_DIR)
            .join(format!("{}.{}", category, file)))
    }
}

impl StorageProvider for DirectoryStorage {
    fn metadata(&self, file: &str, opts: &StorageOptions) -> Result<Box<dyn RandomAccess>> {
        let path = self.file_path("metadata", file)?;
        Ok(Box::new(FileStorage::new(path, opts.clone())))
    }

    fn content(
        &self,
        file: &str,
        opts: &StorageOptions,
        _archive: &dyn Archive,
    ) -> Result<Box<dyn RandomAccess>> {
        let path = self.file_path("content", file)?;
        Ok(Box::new(FileStorage::new(path, opts.clone())))
    }
}

/// Random-access file on local disk
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    opts: StorageOptions,
    file: OnceCell<Mutex<File>>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>, opts: StorageOptions) -> Self {
        Self {
            path: path.into(),
            opts,
            file: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(self.opts.truncate)
            .open(&self.path)
            .await?;

        if let Some(size) = self.opts.size {
            file.set_len(size).await?;
        }

        tracing::debug!("Opened storage file {}", self.path.display());
        Ok(file)
    }

    async fn handle(&self) -> Result<&Mutex<File>> {
        self.file
            .get_or_try_init(|| async { self.open().await.map(Mutex::new) })
            .await
    }
}

#[async_trait]
impl RandomAccess for FileStorage {
    async fn read(&self, offset: u64, len: u64) -> Result<Bytes> {
        let mut file = self.handle().await?.lock().await;

        let size = file.metadata().await?.len();
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(HybridError::OutOfBounds { offset, len, size });
        }

        let mut buf = vec![0u8; len as usize];
        file.seek(SeekFrom::Start(offset)).await?;
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut file = self.handle().await?.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn truncate(&self, len: u64) -> Result<()> {
        let file = self.handle().await?.lock().await;
        file.set_len(len).await?;
        Ok(())
    }

    async fn size(&self) -> Result<u64> {
        let file = self.handle().await?.lock().await;
        Ok(file.metadata().await?.len())
    }
}
