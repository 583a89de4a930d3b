//! Error types for the hybrid storage backend

use thiserror::Error;

/// Result type alias for hybrid storage operations
pub type Result<T> = std::result::Result<T, HybridError>;

/// Main error type for hybrid storage
#[derive(Error, Debug)]
pub enum HybridError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Local entry missing: {0}")]
    LocalEntryMissing(String),

    #[error("Transfer to {target} failed: {source}")]
    TransferFailure {
        target: String,
        #[source]
        source: Box<HybridError>,
    },

    #[error("Storage is read-only: {0}")]
    ReadOnly(String),

    #[error("Read out of bounds: offset={offset} len={len} size={size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HybridError {
    /// Wrap an error raised inside the copy pipeline for `target`
    pub fn transfer(target: impl Into<String>, source: HybridError) -> Self {
        HybridError::TransferFailure {
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// Check if error is retryable by running another pass
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HybridError::RemoteUnavailable(_)
                | HybridError::TransferFailure { .. }
                | HybridError::Io(_)
        )
    }

    /// Check if the error means the remote object or local entry is absent
    pub fn is_not_found(&self) -> bool {
        match self {
            HybridError::ObjectNotFound(_) | HybridError::LocalEntryMissing(_) => true,
            HybridError::TransferFailure { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
