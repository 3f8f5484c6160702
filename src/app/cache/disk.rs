//! Disk tier: one file per key, written by a single ordered worker
//!
//! Writes, removals and clears are queued on an unbounded channel and applied
//! one at a time by a background task, so operations on the same key never
//! interleave and callers never wait on disk I/O. Failures are logged and
//! counted; they are never reported to the operation's caller. Reads are
//! synchronous and may run on any thread.
//!
//! Reads see queued operations before the worker applies them: every enqueue
//! records its effect in an overlay keyed by cache key, and the worker drops
//! an overlay entry once the operation that set it has been applied.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::app::cache::path::PathGenerator;
use crate::app::cache::stats::DirectoryScanner;
use crate::app::image::{Image, ImageCodec};
use crate::app::key::CacheKey;
use crate::errors::{CacheError, CacheResult};

/// Operation applied by the disk worker
///
/// `seq` ties an operation to the overlay entry it created.
#[derive(Debug)]
enum DiskOp {
    Write {
        seq: u64,
        key: CacheKey,
        bytes: Arc<Vec<u8>>,
    },
    Encode {
        seq: u64,
        key: CacheKey,
        image: Image,
        codec: Arc<dyn ImageCodec>,
    },
    Remove {
        seq: u64,
        key: CacheKey,
    },
    Clear {
        seq: u64,
    },
    Flush(oneshot::Sender<()>),
}

/// Effect of a queued operation that has not reached the filesystem yet
#[derive(Debug, Clone)]
enum PendingDisk {
    Bytes(Arc<Vec<u8>>),
    Image {
        image: Image,
        codec: Arc<dyn ImageCodec>,
    },
    Tombstone,
}

#[derive(Debug)]
struct PendingEntry {
    seq: u64,
    state: PendingDisk,
}

/// Queued operations as seen by readers
#[derive(Debug, Default)]
struct PendingOps {
    next_seq: u64,
    entries: HashMap<CacheKey, PendingEntry>,
    /// Sequence of a queued clear; hides every file not in `entries`
    clear_seq: Option<u64>,
}

impl PendingOps {
    fn lookup(&self, key: &CacheKey) -> Option<PendingDisk> {
        match self.entries.get(key) {
            Some(entry) => Some(entry.state.clone()),
            None if self.clear_seq.is_some() => Some(PendingDisk::Tombstone),
            None => None,
        }
    }

    /// Drop the entry for `key` if `seq` is still the latest operation on it
    fn applied(&mut self, key: &CacheKey, seq: u64) {
        if self.entries.get(key).is_some_and(|entry| entry.seq == seq) {
            self.entries.remove(key);
        }
    }

    fn cleared(&mut self, seq: u64) {
        if self.clear_seq == Some(seq) {
            self.clear_seq = None;
        }
    }
}

#[derive(Debug, Default)]
struct DiskCounters {
    writes: AtomicU64,
    write_failures: AtomicU64,
    removes: AtomicU64,
    remove_failures: AtomicU64,
}

/// Counters of the disk tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskStats {
    /// Files written successfully
    pub writes: u64,
    /// Writes that failed and were dropped
    pub write_failures: u64,
    /// Files removed (including clears)
    pub removes: u64,
    /// Removals that failed
    pub remove_failures: u64,
}

/// Persistent store for encoded image payloads
#[derive(Debug)]
pub struct DiskStore {
    paths: PathGenerator,
    sender: mpsc::UnboundedSender<DiskOp>,
    pending: Arc<Mutex<PendingOps>>,
    counters: Arc<DiskCounters>,
}

impl DiskStore {
    /// Open the store, creating the directory and starting the worker
    ///
    /// Must be called from within a tokio runtime. The worker stops once the
    /// store is dropped and every queued operation has been applied.
    pub async fn open(root: impl Into<PathBuf>, prefix: impl Into<String>) -> CacheResult<Self> {
        let paths = PathGenerator::new(root, prefix);

        fs::create_dir_all(paths.root()).await.map_err(|e| {
            warn!("Cannot create cache directory {}: {}", paths.root().display(), e);
            CacheError::DirectoryNotAccessible {
                path: paths.root().to_path_buf(),
            }
        })?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(PendingOps::default()));
        let counters = Arc::new(DiskCounters::default());

        let worker = DiskWorker {
            paths: paths.clone(),
            receiver,
            pending: pending.clone(),
            counters: counters.clone(),
        };
        tokio::spawn(worker.run());

        info!("Disk cache opened at {}", paths.root().display());

        Ok(Self {
            paths,
            sender,
            pending,
            counters,
        })
    }

    /// Cache directory
    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    /// File that holds (or would hold) a key's payload
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.paths.file_path(key)
    }

    /// Queue a payload for persistence
    pub fn write(&self, key: CacheKey, bytes: Vec<u8>) {
        let bytes = Arc::new(bytes);
        self.enqueue_for(
            key,
            PendingDisk::Bytes(bytes.clone()),
            |seq, key| DiskOp::Write { seq, key, bytes },
            &self.counters.write_failures,
        );
    }

    /// Queue an image to be encoded and persisted by the worker
    pub fn write_image(&self, key: CacheKey, image: Image, codec: Arc<dyn ImageCodec>) {
        let state = PendingDisk::Image {
            image: image.clone(),
            codec: codec.clone(),
        };
        self.enqueue_for(
            key,
            state,
            |seq, key| DiskOp::Encode {
                seq,
                key,
                image,
                codec,
            },
            &self.counters.write_failures,
        );
    }

    /// Queue deletion of a key's file; removing an absent key is a no-op
    pub fn remove(&self, key: CacheKey) {
        self.enqueue_for(
            key,
            PendingDisk::Tombstone,
            |seq, key| DiskOp::Remove { seq, key },
            &self.counters.remove_failures,
        );
    }

    /// Queue deletion of every cache file
    pub fn clear(&self) {
        let mut pending = self.pending.lock();
        let seq = pending.next_seq;
        pending.next_seq += 1;
        pending.entries.clear();
        pending.clear_seq = Some(seq);

        if self.sender.send(DiskOp::Clear { seq }).is_err() {
            pending.clear_seq = None;
            self.counters.remove_failures.fetch_add(1, Ordering::Relaxed);
            warn!("{}", CacheError::WorkerStopped);
        }
    }

    /// Record the pending effect and enqueue under one lock so overlay
    /// sequence order matches channel order
    fn enqueue_for(
        &self,
        key: CacheKey,
        state: PendingDisk,
        op: impl FnOnce(u64, CacheKey) -> DiskOp,
        failures: &AtomicU64,
    ) {
        let mut pending = self.pending.lock();
        let seq = pending.next_seq;
        pending.next_seq += 1;

        if self.sender.send(op(seq, key.clone())).is_err() {
            failures.fetch_add(1, Ordering::Relaxed);
            warn!("{}", CacheError::WorkerStopped);
            return;
        }
        pending.entries.insert(key, PendingEntry { seq, state });
    }

    /// Read a key's payload; `None` when there is no readable file
    ///
    /// Queued writes and removals take effect here immediately.
    pub fn read(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let queued = self.pending.lock().lookup(key);
        match queued {
            Some(PendingDisk::Bytes(bytes)) => {
                trace!("Disk hit (queued): {}", key);
                return Some(bytes.as_ref().clone());
            }
            Some(PendingDisk::Image { image, codec }) => {
                trace!("Disk hit (queued image): {}", key);
                return match codec.encode(&image) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        debug!("Queued image for {} does not encode: {}", key, e);
                        None
                    }
                };
            }
            Some(PendingDisk::Tombstone) => {
                trace!("Disk miss (queued removal): {}", key);
                return None;
            }
            None => {}
        }

        let path = self.paths.file_path(key);
        match std::fs::read(&path) {
            Ok(bytes) => {
                trace!("Disk hit: {}", key);
                Some(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("Disk miss: {}", key);
                None
            }
            Err(e) => {
                warn!("Failed to read cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// True when a file exists, or is queued to exist, for the key
    pub fn contains(&self, key: &CacheKey) -> bool {
        let queued = self.pending.lock().lookup(key);
        match queued {
            Some(PendingDisk::Tombstone) => false,
            Some(_) => true,
            None => self.paths.file_path(key).is_file(),
        }
    }

    /// Wait until every operation queued before this call has been applied
    pub async fn flush(&self) -> CacheResult<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DiskOp::Flush(tx))
            .map_err(|_| CacheError::WorkerStopped)?;
        rx.await.map_err(|_| CacheError::WorkerStopped)
    }

    /// Count cache files and their total size
    pub async fn scan(&self) -> (usize, u64) {
        DirectoryScanner::scan_cache_directory(&self.paths).await
    }

    /// Counter snapshot
    pub fn stats(&self) -> DiskStats {
        DiskStats {
            writes: self.counters.writes.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
            removes: self.counters.removes.load(Ordering::Relaxed),
            remove_failures: self.counters.remove_failures.load(Ordering::Relaxed),
        }
    }
}

/// Background task applying disk operations in order
struct DiskWorker {
    paths: PathGenerator,
    receiver: mpsc::UnboundedReceiver<DiskOp>,
    pending: Arc<Mutex<PendingOps>>,
    counters: Arc<DiskCounters>,
}

impl DiskWorker {
    async fn run(mut self) {
        self.sweep_temp_files().await;

        while let Some(op) = self.receiver.recv().await {
            match op {
                DiskOp::Write { seq, key, bytes } => {
                    self.write(&key, &bytes).await;
                    self.pending.lock().applied(&key, seq);
                }
                DiskOp::Encode {
                    seq,
                    key,
                    image,
                    codec,
                } => {
                    self.encode_and_write(&key, image, codec).await;
                    self.pending.lock().applied(&key, seq);
                }
                DiskOp::Remove { seq, key } => {
                    self.remove(&key).await;
                    self.pending.lock().applied(&key, seq);
                }
                DiskOp::Clear { seq } => {
                    self.clear().await;
                    self.pending.lock().cleared(seq);
                }
                DiskOp::Flush(done) => {
                    // Receiver may have given up waiting
                    let _ = done.send(());
                }
            }
        }

        debug!("Disk worker for {} stopped", self.paths.root().display());
    }

    async fn write(&self, key: &CacheKey, bytes: &[u8]) {
        match self.save_file_atomic(key, bytes).await {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                debug!("Wrote {} bytes for {}", bytes.len(), key);
            }
            Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping disk write for {}: {}", key, e);
            }
        }
    }

    /// Encode off the async threads, then write
    async fn encode_and_write(&self, key: &CacheKey, image: Image, codec: Arc<dyn ImageCodec>) {
        let encoded = tokio::task::spawn_blocking(move || codec.encode(&image)).await;
        match encoded {
            Ok(Ok(bytes)) => self.write(key, &bytes).await,
            Ok(Err(e)) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Keeping {} in memory only, encoding failed: {}", key, e);
            }
            Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Encode task for {} failed: {}", key, e);
            }
        }
    }

    /// Write to a temp file then rename over the final path
    async fn save_file_atomic(&self, key: &CacheKey, bytes: &[u8]) -> CacheResult<()> {
        let final_path = self.paths.file_path(key);
        let temp_path = self.paths.temp_path(key);

        fs::write(&temp_path, bytes)
            .await
            .map_err(|source| CacheError::Io {
                operation: "write",
                path: temp_path.clone(),
                source,
            })?;

        if let Err(source) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CacheError::Io {
                operation: "rename",
                path: final_path,
                source,
            });
        }

        Ok(())
    }

    async fn remove(&self, key: &CacheKey) {
        let path = self.paths.file_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.counters.removes.fetch_add(1, Ordering::Relaxed);
                debug!("Removed cache file for {}", key);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("No cache file to remove for {}", key);
            }
            Err(e) => {
                self.counters.remove_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }

    async fn clear(&self) {
        let mut entries = match fs::read_dir(self.paths.root()).await {
            Ok(entries) => entries,
            Err(e) => {
                self.counters.remove_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Cannot list cache directory {}: {}",
                    self.paths.root().display(),
                    e
                );
                return;
            }
        };

        let mut removed = 0u64;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !self.paths.is_cache_file(&path) && !self.paths.is_temp_file(&path) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    self.counters.remove_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }

        self.counters.removes.fetch_add(removed, Ordering::Relaxed);
        info!("Cleared {} cache files", removed);
    }

    /// Delete leftovers of writes interrupted by a crash
    async fn sweep_temp_files(&self) {
        let Ok(mut entries) = fs::read_dir(self.paths.root()).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if self.paths.is_temp_file(&path) && fs::remove_file(&path).await.is_ok() {
                debug!("Removed stale temp file {}", path.display());
            }
        }
    }
}
