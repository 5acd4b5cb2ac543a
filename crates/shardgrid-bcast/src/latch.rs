//! Drain latch — counts consumers that still have to react to a change.
//!
//! The publisher arms the latch before broadcasting; each consumer calls
//! [`DrainLatch::done`] once it has rebuilt its state. `wait` resolves when
//! the count returns to zero.

use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug)]
pub struct DrainLatch {
    name: String,
    count: watch::Sender<usize>,
}

impl DrainLatch {
    pub fn new(name: &str) -> Self {
        let (count, _) = watch::channel(0);
        Self {
            name: name.to_string(),
            count,
        }
    }

    /// Expect `n` more consumers to report completion.
    pub fn add(&self, n: usize) {
        self.count.send_modify(|c| *c += n);
        debug!(latch = %self.name, pending = self.pending(), "drain latch armed");
    }

    /// Report one consumer done. Extra calls never drive the count below zero.
    pub fn done(&self) {
        self.count.send_modify(|c| *c = c.saturating_sub(1));
        debug!(latch = %self.name, pending = self.pending(), "drain latch released");
    }

    pub fn pending(&self) -> usize {
        *self.count.borrow()
    }

    /// Follow the pending count as it changes.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }

    /// Wait until every armed consumer has reported done.
    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|c| *c == 0).await;
    }

    /// Like [`wait`](Self::wait), bounded. Returns false on timeout.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}
