//! Bounded LRU cache of open per-key archive files, each owned by its own
//! worker task. Eviction always flushes and closes the victim before its
//! slot is reused.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use carbon_core::{DaemonMetrics, DataPoint};
use lru::LruCache;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::resolver::StorageResolver;

/// A batch write, optionally paired with a completion signal for callers
/// that want to wait until the write has actually reached disk.
pub(crate) enum WorkerMsg {
    Write(Vec<DataPoint>, Option<oneshot::Sender<()>>),
}

/// A live entry's half of the eviction protocol: send on `inbox` to queue
/// work, drop it to signal "no more messages," then await `shutdown_ack`
/// for the worker's confirmation that it flushed and closed the file.
struct LiveEntry {
    inbox: mpsc::Sender<WorkerMsg>,
    shutdown_ack: oneshot::Receiver<()>,
    task: JoinHandle<()>,
}

enum PoolEntry {
    Live(LiveEntry),
    /// File creation failed for this key; skip it until the next eviction
    /// clears the slot, rather than retrying every batch.
    Dead,
}

/// What a caller gets back from [`HandlePool::get_or_create`].
pub(crate) enum PoolHandle {
    Live(mpsc::Sender<WorkerMsg>),
    Dead,
}

fn key_to_path(base_dir: &Path, key: &str) -> PathBuf {
    let mut path = base_dir.to_path_buf();
    let mut parts: VecDeque<&str> = key.split('.').collect();
    let file_part = parts.pop_back().unwrap_or(key);
    for dir_part in parts {
        path.push(dir_part);
    }
    path.push(format!("{file_part}.wsp"));
    path
}

/// Ordered map, capacity `C`, from key to live archive-file worker.
pub(crate) struct HandlePool {
    entries: LruCache<String, PoolEntry>,
    base_dir: PathBuf,
    resolver: Arc<StorageResolver>,
    inbox_capacity: usize,
    metrics: Arc<DaemonMetrics>,
}

impl HandlePool {
    pub(crate) fn new(
        capacity: NonZeroUsize,
        base_dir: PathBuf,
        resolver: Arc<StorageResolver>,
        inbox_capacity: usize,
        metrics: Arc<DaemonMetrics>,
    ) -> Self {
        Self {
            entries: LruCache::new(capacity),
            base_dir,
            resolver,
            inbox_capacity,
            metrics,
        }
    }

    /// Return the existing entry for `key` (marking it most-recently-used)
    /// or create one, evicting the LRU victim first if the pool is full.
    pub(crate) async fn get_or_create(&mut self, key: &str) -> PoolHandle {
        if let Some(entry) = self.entries.get(key) {
            return match entry {
                PoolEntry::Live(live) => PoolHandle::Live(live.inbox.clone()),
                PoolEntry::Dead => PoolHandle::Dead,
            };
        }

        if self.entries.len() >= self.entries.cap().get() {
            if let Some((victim_key, victim)) = self.entries.pop_lru() {
                tracing::debug!(key = %victim_key, "evicting handle pool entry to make room");
                self.flush_entry(victim).await;
            }
        }

        let entry = self.open_entry(key).await;
        let handle = match &entry {
            PoolEntry::Live(live) => {
                self.metrics.handles_open.fetch_add(1, Ordering::Relaxed);
                PoolHandle::Live(live.inbox.clone())
            }
            PoolEntry::Dead => {
                self.metrics
                    .points_dropped_resolver
                    .fetch_add(1, Ordering::Relaxed);
                PoolHandle::Dead
            }
        };
        self.entries.put(key.to_string(), entry);
        handle
    }

    /// Remove and flush the entry for `key`, if present.
    pub(crate) async fn evict(&mut self, key: &str) {
        if let Some(entry) = self.entries.pop(key) {
            self.flush_entry(entry).await;
        }
    }

    /// Evict every entry. Used during shutdown.
    pub(crate) async fn drain_all(&mut self) {
        while let Some((_, entry)) = self.entries.pop_lru() {
            self.flush_entry(entry).await;
        }
    }

    async fn flush_entry(&self, entry: PoolEntry) {
        if let PoolEntry::Live(live) = entry {
            drop(live.inbox);
            let _ = live.shutdown_ack.await;
            let _ = live.task.await;
            self.metrics.handles_open.fetch_sub(1, Ordering::Relaxed);
            self.metrics
                .handle_pool_evictions
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn open_entry(&self, key: &str) -> PoolEntry {
        let policy = match self.resolver.find(key) {
            Ok(policy) => policy,
            Err(e) => {
                tracing::warn!(%key, error = %e, "no storage policy for key, skipping");
                return PoolEntry::Dead;
            }
        };
        let path = key_to_path(&self.base_dir, key);
        let archive = match carbon_rrd::ArchiveFile::create(
            &path,
            policy.retentions.clone(),
            policy.aggregation_method,
            policy.x_files_factor,
        ) {
            Ok(archive) => archive,
            Err(carbon_rrd::ArchiveError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                match carbon_rrd::ArchiveFile::open(&path) {
                    Ok(archive) => archive,
                    Err(e) => {
                        tracing::warn!(%key, error = %e, "failed to open existing archive, skipping");
                        return PoolEntry::Dead;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "failed to create archive, skipping");
                return PoolEntry::Dead;
            }
        };

        let (inbox_tx, inbox_rx) = mpsc::channel(self.inbox_capacity);
        let (ack_tx, ack_rx) = oneshot::channel();
        let key_owned = key.to_string();
        let task = tokio::task::spawn_blocking(move || run_worker(key_owned, archive, inbox_rx, ack_tx));

        PoolEntry::Live(LiveEntry {
            inbox: inbox_tx,
            shutdown_ack: ack_rx,
            task,
        })
    }
}

/// Runs on a blocking thread: owns one archive file exclusively, serializing
/// every write to it, until its inbox is closed.
fn run_worker(
    key: String,
    mut archive: carbon_rrd::ArchiveFile,
    mut inbox: mpsc::Receiver<WorkerMsg>,
    shutdown_ack: oneshot::Sender<()>,
) {
    while let Some(msg) = inbox.blocking_recv() {
        match msg {
            WorkerMsg::Write(points, done) => {
                if let Err(e) = archive.update_many(&points) {
                    tracing::error!(%key, error = %e, "archive write failed");
                }
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
        }
    }
    if let Err(e) = archive.close() {
        tracing::error!(%key, error = %e, "archive close failed");
    }
    let _ = shutdown_ack.send(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_to_path_nests_by_dot() {
        let base = Path::new("/tmp/t");
        assert_eq!(
            key_to_path(base, "foo.bar"),
            PathBuf::from("/tmp/t/foo/bar.wsp")
        );
        assert_eq!(
            key_to_path(base, "machine.cpu.user"),
            PathBuf::from("/tmp/t/machine/cpu/user.wsp")
        );
        assert_eq!(key_to_path(base, "single"), PathBuf::from("/tmp/t/single.wsp"));
    }
}
