//! Shutdown coordination.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::lifecycle::signals;

/// Broadcasts a single shutdown notification to every subscriber.
///
/// Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify all current subscribers. Later calls are harmless.
    pub fn trigger(&self, reason: &str) {
        tracing::info!(
            reason,
            subscribers = self.tx.receiver_count(),
            "Shutdown triggered"
        );
        let _ = self.tx.send(());
    }

    /// Trigger on the first SIGINT or SIGTERM.
    pub fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            let signal = signals::wait_for_signal().await;
            shutdown.trigger(signal);
        })
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
