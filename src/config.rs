//! Configuration for the hybrid storage backend

use std::path::PathBuf;

use serde::Deserialize;

use crate::chunk::DEFAULT_BLOCK_SIZE;
use crate::error::{HybridError, Result};

/// Where metadata lives locally and where content lives in the object store
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HybridConfig {
    /// Directory holding the local metadata store
    pub local_dir: PathBuf,
    /// Bucket holding the content
    pub bucket: String,
    /// Key prefix of the content inside the bucket
    #[serde(default)]
    pub prefix: String,
    /// Block size used when importing into the content log
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Upper bound on simultaneous transfers during an import (None = unbounded)
    #[serde(default)]
    pub max_concurrent_transfers: Option<usize>,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl HybridConfig {
    /// Create a config from its separate parts
    pub fn new(
        local_dir: impl Into<PathBuf>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            local_dir: local_dir.into(),
            bucket: bucket.into(),
            prefix: prefix.into(),
            block_size: DEFAULT_BLOCK_SIZE,
            max_concurrent_transfers: None,
        }
    }

    /// Create from S3-compatible URI (s3://bucket/path/)
    pub fn from_uri(uri: &str, local_dir: impl Into<PathBuf>) -> Result<Self> {
        let (bucket, prefix) = parse_s3_uri(uri)?;
        Ok(Self::new(local_dir, bucket, prefix))
    }

    /// Set the import block size (0 restores the default)
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = if block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            block_size
        };
        self
    }

    /// Bound the number of in-flight transfers during an import
    pub fn with_max_concurrent_transfers(mut self, limit: usize) -> Self {
        self.max_concurrent_transfers = Some(limit);
        self
    }

    /// Reject configurations that cannot address any content
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(HybridError::InvalidConfiguration(
                "bucket must not be empty".to_string(),
            ));
        }
        if self.bucket.contains('/') {
            return Err(HybridError::InvalidConfiguration(format!(
                "bucket name must not contain '/': {}",
                self.bucket
            )));
        }
        if self.local_dir.as_os_str().is_empty() {
            return Err(HybridError::InvalidConfiguration(
                "local_dir must not be empty".to_string(),
            ));
        }
        if self.max_concurrent_transfers == Some(0) {
            return Err(HybridError::InvalidConfiguration(
                "max_concurrent_transfers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split `s3://bucket/path/` into bucket and key prefix.
///
/// The prefix is returned as written (possibly empty); the importer
/// normalizes it to a directory form itself.
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let rest = uri.strip_prefix("s3://").ok_or_else(|| {
        HybridError::InvalidConfiguration(format!("URI must start with s3://: {}", uri))
    })?;

    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix),
        None => (rest, ""),
    };

    if bucket.is_empty() {
        return Err(HybridError::InvalidConfiguration(
            "URI must be s3://bucket/path".to_string(),
        ));
    }

    Ok((bucket.to_string(), prefix.to_string()))
}

/// Normalize a key prefix so it ends with exactly one separator.
///
/// An empty prefix addresses the bucket root and stays empty.
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}
