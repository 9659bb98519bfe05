//! `MetricCache`: an in-memory per-key append log that accepts data points
//! from many concurrent producers without blocking, and exposes drain
//! operations to the single `CacheDrainer` consumer.
//!
//! Internally a single worker task owns the `key -> Vec<DataPoint>` map
//! exclusively; every public method is a message sent across a bounded
//! channel and a typed reply awaited on a one-shot channel. This replaces
//! a dynamically-typed command-with-opaque-payload design with a tagged
//! variant per operation, so each carries its own reply type.

use std::collections::HashMap;

use carbon_core::{CoreError, DataPoint, Metric, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum Command {
    Store {
        metric: Metric,
    },
    Size {
        reply: oneshot::Sender<usize>,
    },
    Pop {
        key: String,
        reply: oneshot::Sender<Vec<DataPoint>>,
    },
    Counts {
        reply: oneshot::Sender<HashMap<String, usize>>,
    },
    Close {
        reply: oneshot::Sender<HashMap<String, Vec<DataPoint>>>,
    },
}

/// Handle to the cache's worker task. Cloning is cheap; every clone talks to
/// the same underlying map.
#[derive(Debug, Clone)]
pub struct MetricCache {
    inbox: mpsc::Sender<Command>,
}

impl MetricCache {
    /// Spawn the worker task and return a handle plus its `JoinHandle`.
    #[must_use]
    pub fn spawn(command_queue_capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(command_queue_capacity);
        let task = tokio::spawn(run_worker(rx));
        (Self { inbox: tx }, task)
    }

    /// Append a data point for `metric.key`. Returns as soon as the command
    /// is handed to the worker's inbox; delivery is eventual but guaranteed
    /// while the cache is open.
    pub async fn store(&self, metric: Metric) -> Result<()> {
        self.inbox
            .send(Command::Store { metric })
            .await
            .map_err(|_| CoreError::Closed)
    }

    /// Total point count across every key, as of the moment this command is
    /// processed.
    pub async fn size(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Command::Size { reply })
            .await
            .map_err(|_| CoreError::Closed)?;
        rx.await.map_err(|_| CoreError::Closed)
    }

    /// Atomically remove and return every point stored for `key`. Returns an
    /// empty vector (and leaves `count` untouched) if `key` is absent.
    pub async fn pop(&self, key: impl Into<String>) -> Result<Vec<DataPoint>> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Command::Pop {
                key: key.into(),
                reply,
            })
            .await
            .map_err(|_| CoreError::Closed)?;
        rx.await.map_err(|_| CoreError::Closed)
    }

    /// Snapshot of `{key: point_count}` for every non-empty key.
    pub async fn counts(&self) -> Result<HashMap<String, usize>> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Command::Counts { reply })
            .await
            .map_err(|_| CoreError::Closed)?;
        rx.await.map_err(|_| CoreError::Closed)
    }

    /// Drain the cache, terminate the worker task, and return every
    /// remaining point grouped by key. Subsequent `store` calls fail with
    /// `Closed`.
    pub async fn close(&self) -> Result<HashMap<String, Vec<DataPoint>>> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Command::Close { reply })
            .await
            .map_err(|_| CoreError::Closed)?;
        rx.await.map_err(|_| CoreError::Closed)
    }
}

async fn run_worker(mut inbox: mpsc::Receiver<Command>) {
    let mut points: HashMap<String, Vec<DataPoint>> = HashMap::new();
    let mut count: usize = 0;

    while let Some(command) = inbox.recv().await {
        match command {
            Command::Store { metric } => {
                points.entry(metric.key).or_default().push(metric.point);
                count += 1;
            }
            Command::Size { reply } => {
                let _ = reply.send(count);
            }
            Command::Pop { key, reply } => {
                let popped = points.remove(&key).unwrap_or_default();
                count -= popped.len();
                let _ = reply.send(popped);
            }
            Command::Counts { reply } => {
                let snapshot = points.iter().map(|(k, v)| (k.clone(), v.len())).collect();
                let _ = reply.send(snapshot);
            }
            Command::Close { reply } => {
                let _ = reply.send(points);
                return;
            }
        }
    }
}
