//! In-memory archive
//!
//! Writes are staged per sink and published atomically on `finish`, so an
//! interrupted transfer never appears as a complete entry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;

use super::{Archive, BlockSink, EntryStat};
use crate::error::{HybridError, Result};

#[derive(Debug, Clone)]
struct Entry {
    blocks: Vec<Bytes>,
    size: u64,
}

#[derive(Default)]
struct Inner {
    entries: RwLock<BTreeMap<String, Entry>>,
    streams_opened: AtomicUsize,
}

/// Archive kept entirely in memory
#[derive(Clone, Default)]
pub struct MemoryArchive {
    inner: Arc<Inner>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry directly, bypassing the write stream
    pub fn insert(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        let data = data.into();
        let entry = Entry {
            size: data.len() as u64,
            blocks: vec![data],
        };
        self.inner.entries.write().insert(path.into(), entry);
    }

    /// Full content of an entry
    pub fn read(&self, path: &str) -> Option<Bytes> {
        let entries = self.inner.entries.read();
        let entry = entries.get(path)?;
        let mut out = BytesMut::with_capacity(entry.size as usize);
        for block in &entry.blocks {
            out.extend_from_slice(block);
        }
        Some(out.freeze())
    }

    /// Lengths of the blocks an entry was written with
    pub fn block_sizes(&self, path: &str) -> Option<Vec<usize>> {
        self.inner
            .entries
            .read()
            .get(path)
            .map(|entry| entry.blocks.iter().map(Bytes::len).collect())
    }

    /// Logical paths currently present
    pub fn paths(&self) -> Vec<String> {
        self.inner.entries.read().keys().cloned().collect()
    }

    /// Number of write streams opened so far
    pub fn streams_opened(&self) -> usize {
        self.inner.streams_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Archive for MemoryArchive {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.inner.entries.read().contains_key(path))
    }

    async fn stat(&self, path: &str) -> Result<EntryStat> {
        self.inner
            .entries
            .read()
            .get(path)
            .map(|entry| EntryStat {
                path: path.to_string(),
                size: entry.size,
            })
            .ok_or_else(|| HybridError::LocalEntryMissing(path.to_string()))
    }

    async fn create_write_stream(&self, path: &str) -> Result<Box<dyn BlockSink>> {
        self.inner.streams_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySink {
            inner: Arc::clone(&self.inner),
            path: path.to_string(),
            blocks: Vec::new(),
            size: 0,
        }))
    }
}

struct MemorySink {
    inner: Arc<Inner>,
    path: String,
    blocks: Vec<Bytes>,
    size: u64,
}

#[async_trait]
impl BlockSink for MemorySink {
    async fn write(&mut self, block: Bytes) -> Result<()> {
        self.size += block.len() as u64;
        self.blocks.push(block);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        let MemorySink {
            inner,
            path,
            blocks,
            size,
        } = *self;
        inner.entries.write().insert(path, Entry { blocks, size });
        Ok(())
    }
}
