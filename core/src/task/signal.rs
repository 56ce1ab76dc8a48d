use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative stop flag handed to task bodies.
///
/// Synchronous work polls `is_stopping` at safe checkpoints; async work can
/// also `cancelled().await` inside a `select!`.
#[derive(Debug, Clone)]
pub struct StopToken {
    tx: Arc<watch::Sender<bool>>,
}

impl StopToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn request_stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopping(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once a stop was requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|stopping| *stopping).await;
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}
