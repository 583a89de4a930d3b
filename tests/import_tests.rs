//! Synchronization engine tests
//!
//! These tests run full passes against in-memory stores wrapped with fault
//! injection and call counting.
//!
//! Run with: cargo test --test import_tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use hybrid_storage::archive::{Archive, BlockSink, EntryStat, MemoryArchive};
use hybrid_storage::remote::{ByteStream, MemoryRemote, ObjectStat, RemoteStore};
use hybrid_storage::{HybridError, Importer, Result};

// ============================================================================
// TEST DOUBLES
// ============================================================================

#[derive(Default)]
struct Faults {
    list: bool,
    stat: HashSet<String>,
    read: HashSet<String>,
}

struct FlakyRemote {
    inner: MemoryRemote,
    faults: Mutex<Faults>,
    stat_calls: AtomicUsize,
    reads_opened: AtomicUsize,
}

impl FlakyRemote {
    fn new(inner: MemoryRemote) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
            stat_calls: AtomicUsize::new(0),
            reads_opened: AtomicUsize::new(0),
        }
    }

    fn fail_list(&self) {
        self.faults.lock().list = true;
    }

    fn fail_stat(&self, key: &str) {
        self.faults.lock().stat.insert(key.to_string());
    }

    fn fail_read(&self, key: &str) {
        self.faults.lock().read.insert(key.to_string());
    }

    fn heal(&self) {
        *self.faults.lock() = Faults::default();
    }

    fn reads_opened(&self) -> usize {
        self.reads_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if self.faults.lock().list {
            return Err(HybridError::RemoteUnavailable("listing timed out".into()));
        }
        self.inner.list(prefix).await
    }

    async fn stat(&self, key: &str) -> Result<ObjectStat> {
        self.stat_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.lock().stat.contains(key) {
            return Err(HybridError::RemoteUnavailable(format!("HEAD {} -> 503", key)));
        }
        self.inner.stat(key).await
    }

    fn open_read(&self, key: &str) -> ByteStream {
        self.reads_opened.fetch_add(1, Ordering::SeqCst);
        if self.faults.lock().read.contains(key) {
            let err = HybridError::RemoteUnavailable(format!("GET {} reset", key));
            return Box::pin(futures::stream::iter(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(err),
            ]));
        }
        self.inner.open_read(key)
    }

    async fn read_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes> {
        self.inner.read_range(key, offset, len).await
    }
}

/// Archive whose sinks can fail and which tracks concurrently open sinks
struct FaultyArchive {
    inner: MemoryArchive,
    fail_exists: bool,
    fail_write: Mutex<HashSet<String>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl FaultyArchive {
    fn new(inner: MemoryArchive) -> Self {
        Self {
            inner,
            fail_exists: false,
            fail_write: Mutex::new(HashSet::new()),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct TrackedSink {
    inner: Box<dyn BlockSink>,
    fail: bool,
    active: Arc<AtomicUsize>,
}

impl Drop for TrackedSink {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlockSink for TrackedSink {
    async fn write(&mut self, block: Bytes) -> Result<()> {
        // Yield so other transfers get a chance to start
        tokio::task::yield_now().await;
        if self.fail {
            return Err(HybridError::Io(std::io::Error::other("disk full")));
        }
        self.inner.write(block).await
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let inner = std::mem::replace(&mut this.inner, Box::new(NullSink));
        inner.finish().await
    }
}

struct NullSink;

#[async_trait]
impl BlockSink for NullSink {
    async fn write(&mut self, _block: Bytes) -> Result<()> {
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Archive for FaultyArchive {
    async fn exists(&self, path: &str) -> Result<bool> {
        if self.fail_exists {
            return Err(HybridError::Io(std::io::Error::other("metadata corrupt")));
        }
        self.inner.exists(path).await
    }

    async fn stat(&self, path: &str) -> Result<EntryStat> {
        self.inner.stat(path).await
    }

    async fn create_write_stream(&self, path: &str) -> Result<Box<dyn BlockSink>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(TrackedSink {
            inner: self.inner.create_write_stream(path).await?,
            fail: self.fail_write.lock().contains(path),
            active: Arc::clone(&self.active),
        }))
    }
}

fn remote_with(objects: &[(&str, &str)]) -> Arc<FlakyRemote> {
    let inner = MemoryRemote::new().with_piece_size(3);
    for (key, data) in objects {
        inner.put(*key, data.to_string());
    }
    Arc::new(FlakyRemote::new(inner))
}

/// Route engine logs to the test output (RUST_LOG=hybrid_storage=debug)
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn targets(failures: &[hybrid_storage::ImportFailure]) -> Vec<&str> {
    failures.iter().map(|f| f.target.as_str()).collect()
}

// ============================================================================
// DECISIONS
// ============================================================================

#[tokio::test]
async fn new_object_is_always_imported() {
    let remote = remote_with(&[("site/fresh.txt", "fresh")]);
    remote.fail_stat("site/fresh.txt");
    let archive = MemoryArchive::new();
    let importer = Importer::new("bucket", "site", remote.clone());

    let failures = importer.import_all(&archive, None).await.unwrap();

    assert!(failures.is_empty());
    assert_eq!(archive.read("/fresh.txt"), Some(Bytes::from("fresh")));
    assert_eq!(remote.stat_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn equal_size_is_skipped() {
    let remote = remote_with(&[("site/same.txt", "remote")]);
    let archive = MemoryArchive::new();
    archive.insert("/same.txt", "local!");
    let importer = Importer::new("bucket", "site/", remote.clone());

    let failures = importer.import_all(&archive, None).await.unwrap();

    assert!(failures.is_empty());
    assert_eq!(remote.reads_opened(), 0);
    assert_eq!(archive.read("/same.txt"), Some(Bytes::from("local!")));
}

#[tokio::test]
async fn size_mismatch_is_reimported() {
    let remote = remote_with(&[("site/doc.md", "version two, longer")]);
    let archive = MemoryArchive::new();
    archive.insert("/doc.md", "v1");
    let importer = Importer::new("bucket", "site/", remote.clone());

    let failures = importer.import_all(&archive, None).await.unwrap();

    assert!(failures.is_empty());
    assert_eq!(
        archive.read("/doc.md"),
        Some(Bytes::from("version two, longer"))
    );
}

#[tokio::test]
async fn remote_stat_failure_skips_silently() {
    init_tracing();
    let remote = remote_with(&[("site/doc.md", "version two, longer")]);
    remote.fail_stat("site/doc.md");
    let archive = MemoryArchive::new();
    archive.insert("/doc.md", "v1");
    let importer = Importer::new("bucket", "site/", remote.clone());

    let failures = importer.import_all(&archive, None).await.unwrap();

    assert!(failures.is_empty());
    assert_eq!(remote.reads_opened(), 0);
    assert_eq!(archive.read("/doc.md"), Some(Bytes::from("v1")));
}

// ============================================================================
// PASSES
// ============================================================================

#[tokio::test]
async fn second_pass_is_a_no_op() {
    let remote = remote_with(&[
        ("site/a.txt", "alpha"),
        ("site/b/c.txt", "gamma"),
        ("site/b/d.bin", "delta delta"),
    ]);
    let archive = MemoryArchive::new();
    let importer = Importer::new("bucket", "site/", remote.clone());

    assert!(importer.import_all(&archive, Some(4)).await.unwrap().is_empty());
    assert_eq!(remote.reads_opened(), 3);
    assert_eq!(archive.paths(), vec!["/a.txt", "/b/c.txt", "/b/d.bin"]);

    assert!(importer.import_all(&archive, Some(4)).await.unwrap().is_empty());
    assert_eq!(remote.reads_opened(), 3);
    assert_eq!(archive.streams_opened(), 3);
}

#[tokio::test]
async fn one_failure_does_not_block_others() {
    init_tracing();
    let remote = remote_with(&[
        ("site/a.txt", "alpha"),
        ("site/b.txt", "bravo"),
        ("site/c.txt", "charlie"),
        ("site/d.txt", "delta"),
    ]);
    remote.fail_read("site/b.txt");
    remote.fail_read("site/d.txt");
    let archive = MemoryArchive::new();
    let importer = Importer::new("bucket", "site/", remote.clone());

    let failures = importer.import_all(&archive, None).await.unwrap();

    assert_eq!(targets(&failures), vec!["/b.txt", "/d.txt"]);
    assert!(failures
        .iter()
        .all(|f| matches!(f.error, HybridError::TransferFailure { .. })));
    assert_eq!(archive.read("/a.txt"), Some(Bytes::from("alpha")));
    assert_eq!(archive.read("/c.txt"), Some(Bytes::from("charlie")));
    assert!(archive.read("/b.txt").is_none());
    assert!(archive.read("/d.txt").is_none());
}

#[tokio::test]
async fn failed_targets_are_retried_next_pass() {
    init_tracing();
    let remote = remote_with(&[("site/a.txt", "alpha"), ("site/b.txt", "bravo")]);
    let archive = FaultyArchive::new(MemoryArchive::new());
    archive.fail_write.lock().insert("/b.txt".to_string());
    let importer = Importer::new("bucket", "site/", remote.clone());

    let failures = importer.import_all(&archive, None).await.unwrap();
    assert_eq!(targets(&failures), vec!["/b.txt"]);
    assert!(failures[0].error.is_retryable());

    archive.fail_write.lock().clear();
    let failures = importer.import_all(&archive, None).await.unwrap();
    assert!(failures.is_empty());
    assert_eq!(archive.inner.read("/b.txt"), Some(Bytes::from("bravo")));
    // a.txt was already in sync
    assert_eq!(remote.reads_opened(), 3);
}

#[tokio::test]
async fn listing_failure_aborts_the_pass() {
    let remote = remote_with(&[("site/a.txt", "alpha")]);
    remote.fail_list();
    let archive = MemoryArchive::new();
    let importer = Importer::new("bucket", "site/", remote.clone());

    let err = importer.import_all(&archive, None).await.unwrap_err();
    assert!(matches!(err, HybridError::RemoteUnavailable(_)));
    assert_eq!(archive.streams_opened(), 0);

    remote.heal();
    assert!(importer.import_all(&archive, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn local_metadata_failure_aborts_the_pass() {
    let remote = remote_with(&[("site/a.txt", "alpha")]);
    let mut archive = FaultyArchive::new(MemoryArchive::new());
    archive.fail_exists = true;
    let importer = Importer::new("bucket", "site/", remote.clone());

    assert!(importer.import_all(&archive, None).await.is_err());
    assert_eq!(remote.reads_opened(), 0);
}

#[tokio::test]
async fn bounded_transfers_respect_the_limit() {
    let objects: Vec<(String, String)> = (0..6)
        .map(|i| (format!("site/file-{}.txt", i), format!("contents of file {}", i)))
        .collect();
    let refs: Vec<(&str, &str)> = objects
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let remote = remote_with(&refs);
    let archive = FaultyArchive::new(MemoryArchive::new());
    let importer = Importer::new("bucket", "site/", remote.clone())
        .with_max_concurrent_transfers(2);

    let failures = importer.import_all(&archive, Some(5)).await.unwrap();

    assert!(failures.is_empty());
    assert!(archive.max_active.load(Ordering::SeqCst) <= 2);
    assert_eq!(archive.inner.paths().len(), 6);
    assert_eq!(
        archive.inner.block_sizes("/file-0.txt"),
        Some(vec![5, 5, 5, 3])
    );
}

#[tokio::test]
async fn bounded_transfers_isolate_failures() {
    init_tracing();
    let remote = remote_with(&[
        ("site/a.txt", "alpha"),
        ("site/b.txt", "bravo"),
        ("site/c.txt", "charlie"),
        ("site/d.txt", "delta"),
        ("site/e.txt", "echo"),
    ]);
    remote.fail_read("site/a.txt");
    remote.fail_read("site/d.txt");
    let archive = FaultyArchive::new(MemoryArchive::new());
    let importer = Importer::new("bucket", "site/", remote.clone())
        .with_max_concurrent_transfers(2);

    let failures = importer.import_all(&archive, None).await.unwrap();

    assert_eq!(targets(&failures), vec!["/a.txt", "/d.txt"]);
    assert!(failures.iter().all(|f| f.error.is_retryable()));
    assert!(archive.max_active.load(Ordering::SeqCst) <= 2);
    assert_eq!(archive.inner.paths(), vec!["/b.txt", "/c.txt", "/e.txt"]);
    assert_eq!(archive.inner.read("/e.txt"), Some(Bytes::from("echo")));
}

#[tokio::test]
async fn empty_prefix_addresses_bucket_root() {
    let remote = remote_with(&[("top.txt", "top"), ("dir/inner.txt", "inner")]);
    let archive = MemoryArchive::new();
    let importer = Importer::new("bucket", "", remote.clone());

    assert!(importer.import_all(&archive, None).await.unwrap().is_empty());
    assert_eq!(archive.paths(), vec!["/dir/inner.txt", "/top.txt"]);
}
