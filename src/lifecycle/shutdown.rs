//! Shutdown coordination.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Every call to `trigger` is broadcast to all subscribers. The orchestrator
/// treats the first delivery as "start draining" and any later one as
/// "stop now". Cloning yields another handle onto the same channel.
#[derive(Clone, Debug)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    /// Number of times shutdown has been requested.
    requests: Arc<AtomicUsize>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(4);
        Self {
            tx,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribe to shutdown requests.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Request shutdown. Returns how many requests have been made so far,
    /// including this one.
    pub fn trigger(&self) -> usize {
        let count = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.tx.send(());
        count
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for the next shutdown request on `rx`.
///
/// A lagged receiver still counts as a request: it means several were sent.
pub async fn requested(rx: &mut broadcast::Receiver<()>) {
    loop {
        match rx.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
            // Every sender is gone; no request can ever arrive.
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}
