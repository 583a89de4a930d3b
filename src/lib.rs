//! S3 Hybrid Storage
//!
//! Archive storage that keeps structural metadata on local disk and serves
//! the bulk content log from an S3-compatible object store, plus an importer
//! that pulls objects from the store into the archive in fixed-size blocks.

pub mod archive;
pub mod chunk;
pub mod config;
pub mod error;
pub mod hybrid;
pub mod importer;
pub mod remote;
pub mod storage;

pub use config::HybridConfig;
pub use error::{HybridError, Result};
pub use hybrid::S3HybridStorage;
pub use importer::{ImportDecision, ImportFailure, ImportReason, Importer, PlannedImport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
