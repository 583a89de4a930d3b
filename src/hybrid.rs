//! Hybrid storage provider
//!
//! Keeps every metadata file and the small content-feed logs on local disk,
//! while the content log itself is served straight from the object store
//! with ranged reads.

use std::sync::Arc;

use crate::archive::Archive;
use crate::config::HybridConfig;
use crate::error::Result;
use crate::importer::{ImportFailure, Importer};
use crate::remote::RemoteStore;
use crate::storage::{
    DirectoryStorage, RandomAccess, RemoteFile, StorageOptions, StorageProvider, CONTENT_LOG,
};

/// Storage provider with local metadata and S3-backed content
pub struct S3HybridStorage {
    local: Arc<dyn StorageProvider>,
    remote: Arc<dyn RemoteStore>,
    bucket: String,
    prefix: String,
    importer: Importer,
}

impl S3HybridStorage {
    /// Compose a local provider and a remote store under `config`
    pub fn new(
        config: &HybridConfig,
        local: Arc<dyn StorageProvider>,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            local,
            importer: Importer::from_config(config, Arc::clone(&remote)),
            remote,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
        })
    }

    /// Local directory storage for metadata, `remote` for content
    pub fn with_remote(config: &HybridConfig, remote: Arc<dyn RemoteStore>) -> Result<Self> {
        let local = Arc::new(DirectoryStorage::new(&config.local_dir));
        Self::new(config, local, remote)
    }

    /// S3-backed storage using `client`, or one loaded from the environment
    #[cfg(feature = "cloud")]
    pub async fn create(
        config: &HybridConfig,
        client: Option<aws_sdk_s3::Client>,
    ) -> Result<Self> {
        use crate::remote::S3Remote;

        config.validate()?;
        let remote = match client {
            Some(client) => S3Remote::new(client, &config.bucket),
            None => S3Remote::from_env(&config.bucket).await,
        };
        Self::with_remote(config, Arc::new(remote))
    }

    /// Same as [`S3HybridStorage::create`] from an `s3://bucket/path/` URI
    #[cfg(feature = "cloud")]
    pub async fn from_uri(
        uri: &str,
        local_dir: impl Into<std::path::PathBuf>,
        client: Option<aws_sdk_s3::Client>,
    ) -> Result<Self> {
        let config = HybridConfig::from_uri(uri, local_dir)?;
        Self::create(&config, client).await
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn importer(&self) -> &Importer {
        &self.importer
    }

    /// Read-only handle on the remote object backing `file`
    pub fn remote_file(&self, file: &str) -> RemoteFile {
        RemoteFile::new(Arc::clone(&self.remote), format!("{}{}", self.prefix, file))
    }

    /// Pull new or resized objects into `archive`, returning the failures
    pub async fn import_files(
        &self,
        archive: &dyn Archive,
        block_size: Option<usize>,
    ) -> Result<Vec<ImportFailure>> {
        self.importer.import_all(archive, block_size).await
    }
}

impl StorageProvider for S3HybridStorage {
    fn metadata(&self, file: &str, opts: &StorageOptions) -> Result<Box<dyn RandomAccess>> {
        self.local.metadata(file, opts)
    }

    fn content(
        &self,
        file: &str,
        opts: &StorageOptions,
        archive: &dyn Archive,
    ) -> Result<Box<dyn RandomAccess>> {
        if file == CONTENT_LOG {
            tracing::debug!("Serving {} from s3://{}/{}", file, self.bucket, self.prefix);
            return Ok(Box::new(self.remote_file(file)));
        }
        self.local.content(file, opts, archive)
    }
}
