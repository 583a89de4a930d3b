//! Pull content from the object store into the local archive
//!
//! A synchronization pass lists every object under the configured prefix,
//! decides per object whether the archive already holds it (size is the only
//! freshness signal), and streams each missing or resized object into the
//! archive in fixed-size blocks. Per-object failures are isolated and
//! returned; only listing and local metadata failures abort a pass.

use std::sync::Arc;

use futures::future::join_all;
use futures::{stream, StreamExt, TryStreamExt};

use crate::archive::Archive;
use crate::chunk::{FixedChunkStream, DEFAULT_BLOCK_SIZE};
use crate::config::{normalize_prefix, HybridConfig};
use crate::error::{HybridError, Result};
use crate::remote::RemoteStore;

/// Why an object is (re)imported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportReason {
    /// No local entry exists
    Missing,
    /// Local and remote sizes differ
    SizeMismatch { local: u64, remote: u64 },
}

/// Outcome of comparing one remote object against the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDecision {
    Skip,
    Import(ImportReason),
}

impl ImportDecision {
    pub fn is_import(&self) -> bool {
        matches!(self, ImportDecision::Import(_))
    }
}

/// One listed object and what a pass would do with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedImport {
    /// Key relative to the prefix
    pub key: String,
    /// Absolute object key
    pub remote_key: String,
    /// Logical path in the archive
    pub local_path: String,
    pub decision: ImportDecision,
}

/// A target that could not be imported
#[derive(Debug)]
pub struct ImportFailure {
    pub target: String,
    pub error: HybridError,
}

/// Synchronization engine
pub struct Importer {
    bucket: String,
    prefix: String,
    remote: Arc<dyn RemoteStore>,
    block_size: usize,
    max_concurrent_transfers: Option<usize>,
}

impl Importer {
    pub fn new(
        bucket: impl Into<String>,
        prefix: &str,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: normalize_prefix(prefix),
            remote,
            block_size: DEFAULT_BLOCK_SIZE,
            max_concurrent_transfers: None,
        }
    }

    pub fn from_config(config: &HybridConfig, remote: Arc<dyn RemoteStore>) -> Self {
        let importer = Self::new(&config.bucket, &config.prefix, remote)
            .with_block_size(config.block_size);
        match config.max_concurrent_transfers {
            Some(limit) => importer.with_max_concurrent_transfers(limit),
            None => importer,
        }
    }

    /// Default block size for passes that do not specify one
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = if block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            block_size
        };
        self
    }

    /// Bound the number of transfers in flight at once
    pub fn with_max_concurrent_transfers(mut self, limit: usize) -> Self {
        self.max_concurrent_transfers = Some(limit.max(1));
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Normalized key prefix (ends with `/` unless empty)
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Decide Import/Skip for every listed object without transferring
    pub async fn plan(&self, archive: &dyn Archive) -> Result<Vec<PlannedImport>> {
        let keys = self.remote.list(&self.prefix).await?;

        let mut plan = Vec::with_capacity(keys.len());
        for key in keys {
            let remote_key = format!("{}{}", self.prefix, key);
            let local_path = format!("/{}", key);
            let decision = self.decide(archive, &remote_key, &local_path).await?;
            tracing::debug!("{} -> {}: {:?}", remote_key, local_path, decision);
            plan.push(PlannedImport {
                key,
                remote_key,
                local_path,
                decision,
            });
        }
        Ok(plan)
    }

    async fn decide(
        &self,
        archive: &dyn Archive,
        remote_key: &str,
        local_path: &str,
    ) -> Result<ImportDecision> {
        if !archive.exists(local_path).await? {
            return Ok(ImportDecision::Import(ImportReason::Missing));
        }

        let local = archive.stat(local_path).await?;
        match self.remote.stat(remote_key).await {
            Ok(remote) if remote.size != local.size => {
                Ok(ImportDecision::Import(ImportReason::SizeMismatch {
                    local: local.size,
                    remote: remote.size,
                }))
            }
            Ok(_) => Ok(ImportDecision::Skip),
            // Unknown freshness never triggers a transfer
            Err(e) => {
                tracing::warn!("Remote stat failed for {}, skipping: {}", remote_key, e);
                Ok(ImportDecision::Skip)
            }
        }
    }

    /// Run one synchronization pass.
    ///
    /// Returns the targets that failed; an empty list means every object was
    /// imported or already in sync. `block_size` of `None` or `0` uses the
    /// configured default.
    pub async fn import_all(
        &self,
        archive: &dyn Archive,
        block_size: Option<usize>,
    ) -> Result<Vec<ImportFailure>> {
        let block_size = match block_size {
            Some(size) if size > 0 => size,
            _ => self.block_size,
        };

        let plan = self.plan(archive).await?;
        let listed = plan.len();
        let pending: Vec<PlannedImport> = plan
            .into_iter()
            .filter(|planned| planned.decision.is_import())
            .collect();

        let transfers = pending
            .iter()
            .map(|planned| self.import_one(archive, planned, block_size));
        let outcomes: Vec<Option<ImportFailure>> = match self.max_concurrent_transfers {
            Some(limit) => stream::iter(transfers).buffered(limit).collect().await,
            None => join_all(transfers).await,
        };
        let failures: Vec<ImportFailure> = outcomes.into_iter().flatten().collect();

        tracing::info!(
            "Import from s3://{}/{}: {} listed, {} imported, {} skipped, {} failed",
            self.bucket,
            self.prefix,
            listed,
            pending.len() - failures.len(),
            listed - pending.len(),
            failures.len()
        );
        Ok(failures)
    }

    async fn import_one(
        &self,
        archive: &dyn Archive,
        planned: &PlannedImport,
        block_size: usize,
    ) -> Option<ImportFailure> {
        match self
            .transfer(archive, &planned.remote_key, &planned.local_path, block_size)
            .await
        {
            Ok(bytes) => {
                tracing::debug!(
                    "Imported {} bytes from {} into {}",
                    bytes,
                    planned.remote_key,
                    planned.local_path
                );
                None
            }
            Err(e) => {
                tracing::error!("Import of {} failed: {}", planned.remote_key, e);
                Some(ImportFailure {
                    target: planned.local_path.clone(),
                    error: HybridError::transfer(&planned.local_path, e),
                })
            }
        }
    }

    /// remote stream -> fixed-size blocks -> archive write stream
    async fn transfer(
        &self,
        archive: &dyn Archive,
        remote_key: &str,
        local_path: &str,
        block_size: usize,
    ) -> Result<u64> {
        let mut blocks = FixedChunkStream::new(self.remote.open_read(remote_key), block_size);
        let mut sink = archive.create_write_stream(local_path).await?;

        let mut written = 0u64;
        while let Some(block) = blocks.try_next().await? {
            written += block.len() as u64;
            sink.write(block).await?;
        }
        sink.finish().await?;
        Ok(written)
    }
}
