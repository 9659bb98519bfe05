//! `StorageWriter`: routes `(key, points)` batches to a per-key serial
//! worker, bounding the number of open file handles via a [`HandlePool`].

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use carbon_core::{DaemonMetrics, DataPoint};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, StorageError};
use crate::handle_pool::{HandlePool, PoolHandle, WorkerMsg};
use crate::resolver::StorageResolver;

/// Whether `send` returns once a batch is handed off, or once it has been
/// written to disk. Fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Return as soon as the per-key worker's inbox accepts the batch.
    Async,
    /// Return after the per-key worker has completed the write.
    Sync,
}

enum RouterMsg {
    Send {
        key: String,
        points: Vec<DataPoint>,
        ack: oneshot::Sender<Result<()>>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
}

/// Handle to the routing task. Cloning is cheap; all clones share the same
/// underlying pool and worker set.
#[derive(Debug, Clone)]
pub struct StorageWriter {
    inbox: mpsc::Sender<RouterMsg>,
}

impl StorageWriter {
    /// Spawn the routing task and return a handle to it.
    pub fn spawn(
        base_dir: PathBuf,
        resolver: Arc<StorageResolver>,
        handle_pool_capacity: NonZeroUsize,
        mode: WriteMode,
    ) -> (Self, JoinHandle<()>) {
        Self::spawn_with_metrics(
            base_dir,
            resolver,
            handle_pool_capacity,
            mode,
            Arc::new(DaemonMetrics::new()),
        )
    }

    /// Spawn the routing task, reporting handle pool and batch counters to a
    /// caller-supplied [`DaemonMetrics`] instead of a private, unobserved
    /// one. `carbon-daemon` uses this so the writer's counters feed the same
    /// snapshot as the ingestor's.
    pub fn spawn_with_metrics(
        base_dir: PathBuf,
        resolver: Arc<StorageResolver>,
        handle_pool_capacity: NonZeroUsize,
        mode: WriteMode,
        metrics: Arc<DaemonMetrics>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let pool = HandlePool::new(handle_pool_capacity, base_dir, resolver, 16, metrics.clone());
        let task = tokio::spawn(run_router(rx, pool, mode, metrics));
        (Self { inbox: tx }, task)
    }

    /// Enqueue a batch for `key`. Waits for hand-off (async mode) or for the
    /// write to complete (sync mode), per the mode fixed at construction.
    pub async fn send(&self, key: impl Into<String>, points: Vec<DataPoint>) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inbox
            .send(RouterMsg::Send {
                key: key.into(),
                points,
                ack: ack_tx,
            })
            .await
            .map_err(|_| StorageError::Closed)?;
        ack_rx.await.map_err(|_| StorageError::Closed)?
    }

    /// Stop accepting new sends, wait until every per-key worker has flushed
    /// and closed its file, then return.
    pub async fn close(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inbox
            .send(RouterMsg::Close { ack: ack_tx })
            .await
            .map_err(|_| StorageError::Closed)?;
        ack_rx.await.map_err(|_| StorageError::Closed)
    }
}

async fn run_router(
    mut inbox: mpsc::Receiver<RouterMsg>,
    mut pool: HandlePool,
    mode: WriteMode,
    metrics: Arc<DaemonMetrics>,
) {
    while let Some(msg) = inbox.recv().await {
        match msg {
            RouterMsg::Send { key, points, ack } => {
                let handle = pool.get_or_create(&key).await;
                match handle {
                    PoolHandle::Live(worker_inbox) => match mode {
                        WriteMode::Async => {
                            let sent = worker_inbox.send(WorkerMsg::Write(points, None)).await;
                            if sent.is_ok() {
                                metrics.batches_written.fetch_add(1, Ordering::Relaxed);
                            }
                            let _ = ack.send(sent.map_err(|_| StorageError::Closed));
                        }
                        WriteMode::Sync => {
                            let (done_tx, done_rx) = oneshot::channel();
                            if worker_inbox
                                .send(WorkerMsg::Write(points, Some(done_tx)))
                                .await
                                .is_err()
                            {
                                let _ = ack.send(Err(StorageError::Closed));
                                continue;
                            }
                            let result = done_rx.await.map_err(|_| StorageError::Closed);
                            if result.is_ok() {
                                metrics.batches_written.fetch_add(1, Ordering::Relaxed);
                            }
                            let _ = ack.send(result);
                        }
                    },
                    PoolHandle::Dead => {
                        tracing::debug!(%key, "dropping batch for dead pool entry");
                        let _ = ack.send(Ok(()));
                    }
                }
            }
            RouterMsg::Close { ack } => {
                pool.drain_all().await;
                let _ = ack.send(());
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbon_core::DataPoint;

    fn resolver() -> Arc<StorageResolver> {
        Arc::new(
            StorageResolver::from_strs(
                "[default]\npattern = .*\nretentions = 1s:5m,1m:30m\n",
                "[default]\npattern = .*\naggregationMethod = sum\nxFilesFactor = 0.5\n",
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn single_key_write_through() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, _task) = StorageWriter::spawn(
            dir.path().to_path_buf(),
            resolver(),
            NonZeroUsize::new(50).unwrap(),
            WriteMode::Sync,
        );

        let now = 1_000_000i64;
        let points: Vec<DataPoint> = (0..10)
            .map(|i| DataPoint::new(100.0, now - 9 + i))
            .collect();
        writer.send("foo.bar", points).await.unwrap();
        writer.close().await.unwrap();

        let mut archive = carbon_rrd::ArchiveFile::open(&dir.path().join("foo/bar.wsp")).unwrap();
        let fetched = archive.fetch(now - 10, now).unwrap();
        assert_eq!(fetched.len(), 10);
        assert!(fetched.iter().all(|p| p.value == 100.0));
    }

    #[tokio::test]
    async fn eviction_flushes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, _task) = StorageWriter::spawn(
            dir.path().to_path_buf(),
            resolver(),
            NonZeroUsize::new(2).unwrap(),
            WriteMode::Sync,
        );

        let now = 2_000_000i64;
        for key in ["k1", "k2", "k3"] {
            writer
                .send(key, vec![DataPoint::new(1.0, now)])
                .await
                .unwrap();
        }
        writer.close().await.unwrap();

        assert!(dir.path().join("k1.wsp").exists());
        assert!(dir.path().join("k2.wsp").exists());
        assert!(dir.path().join("k3.wsp").exists());
    }

    #[tokio::test]
    async fn metrics_track_batches_and_handle_pool_churn() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = Arc::new(DaemonMetrics::new());
        let (writer, _task) = StorageWriter::spawn_with_metrics(
            dir.path().to_path_buf(),
            resolver(),
            NonZeroUsize::new(1).unwrap(),
            WriteMode::Sync,
            Arc::clone(&metrics),
        );

        writer
            .send("k1", vec![DataPoint::new(1.0, 1_000)])
            .await
            .unwrap();
        // k1's handle is still open here: handles_open == 1, no eviction yet.
        assert_eq!(metrics.handles_open.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.handle_pool_evictions.load(Ordering::Relaxed), 0);

        writer
            .send("k2", vec![DataPoint::new(2.0, 1_000)])
            .await
            .unwrap();
        // Capacity 1 forced k1 out to make room for k2.
        assert_eq!(metrics.handle_pool_evictions.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.handles_open.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.batches_written.load(Ordering::Relaxed), 2);

        writer.close().await.unwrap();
        assert_eq!(metrics.handles_open.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.handle_pool_evictions.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn dead_entry_from_unresolvable_key_counts_as_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = Arc::new(DaemonMetrics::new());
        let unresolvable_resolver = Arc::new(
            StorageResolver::from_strs(
                "[only]\npattern = ^nevermatch$\nretentions = 10s:1d\n",
                "[only]\npattern = ^nevermatch$\naggregationMethod = sum\nxFilesFactor = 0.0\n",
            )
            .unwrap(),
        );
        let (writer, _task) = StorageWriter::spawn_with_metrics(
            dir.path().to_path_buf(),
            unresolvable_resolver,
            NonZeroUsize::new(50).unwrap(),
            WriteMode::Sync,
            Arc::clone(&metrics),
        );

        writer
            .send("anything", vec![DataPoint::new(1.0, 1_000)])
            .await
            .unwrap();
        assert_eq!(metrics.points_dropped_resolver.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.handles_open.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, _task) = StorageWriter::spawn(
            dir.path().to_path_buf(),
            resolver(),
            NonZeroUsize::new(50).unwrap(),
            WriteMode::Async,
        );
        writer.close().await.unwrap();
        let err = writer
            .send("foo", vec![DataPoint::new(1.0, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Closed));
    }
}
