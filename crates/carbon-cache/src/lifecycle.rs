//! Daemon lifecycle state and the broadcast shutdown signal every component
//! subscribes to.

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Tracks daemon state and fans out the shutdown signal.
#[derive(Debug)]
pub struct DaemonLifecycle {
    state: Arc<RwLock<DaemonState>>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Coarse daemon state, used by tests and `carbon-daemon`'s startup log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Components are being wired up; not yet accepting connections.
    Starting,
    /// Accepting connections and draining the cache normally.
    Running,
    /// Shutdown signal sent; components are draining in order.
    ShuttingDown,
    /// Every component has closed.
    Stopped,
}

/// Receiver half of the shutdown broadcast; every long-running task holds
/// one and selects on it alongside its normal work loop.
pub type ShutdownSignal = broadcast::Receiver<()>;

impl DaemonLifecycle {
    /// Create a lifecycle manager in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            state: Arc::new(RwLock::new(DaemonState::Starting)),
            shutdown_tx,
        }
    }

    /// Current daemon state.
    pub async fn state(&self) -> DaemonState {
        *self.state.read().await
    }

    /// Set the daemon state.
    pub async fn set_state(&self, state: DaemonState) {
        *self.state.write().await = state;
    }

    /// Transition to `Running` once every component has started.
    pub async fn start(&self) {
        self.set_state(DaemonState::Running).await;
        tracing::info!("daemon started");
    }

    /// Broadcast the shutdown signal and move to `ShuttingDown`. Subscribers
    /// close their own downstream resources in the order the caller drives
    /// them; this signal only tells them to begin.
    pub async fn shutdown(&self) {
        self.set_state(DaemonState::ShuttingDown).await;
        let _ = self.shutdown_tx.send(());
        tracing::info!("daemon shutdown initiated");
    }

    /// Subscribe to the shutdown signal.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_tx.subscribe()
    }
}

impl Default for DaemonLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_in_starting_state() {
        let lifecycle = DaemonLifecycle::new();
        assert_eq!(lifecycle.state().await, DaemonState::Starting);
    }

    #[tokio::test]
    async fn shutdown_signal_fires_to_all_subscribers() {
        let lifecycle = DaemonLifecycle::new();
        let mut a = lifecycle.shutdown_signal();
        let mut b = lifecycle.shutdown_signal();
        lifecycle.shutdown().await;
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
        assert_eq!(lifecycle.state().await, DaemonState::ShuttingDown);
    }
}
