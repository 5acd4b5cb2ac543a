//! The watch stream abstraction.

use shard_core::WatchEvent;
use tokio::sync::mpsc;

use crate::BoxFuture;

/// A stream of watch events that can be stopped by its consumer.
pub trait WatchInterface<T>: Send {
    /// Next event, or `None` once the stream has ended or been stopped.
    fn recv(&mut self) -> BoxFuture<'_, Option<WatchEvent<T>>>;

    /// Stop the stream. Idempotent. The producer observes the stop on its
    /// next send.
    fn stop(&mut self);
}

pub type BoxWatch<T> = Box<dyn WatchInterface<T>>;

/// Create a bounded channel watch: the consumer half and the producer half.
pub fn channel_watch<T: Send + 'static>(capacity: usize) -> (ChannelWatcher<T>, WatchSender<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelWatcher { rx }, WatchSender { tx })
}

/// Consumer half of a channel-backed watch.
pub struct ChannelWatcher<T> {
    rx: mpsc::Receiver<WatchEvent<T>>,
}

impl<T: Send + 'static> WatchInterface<T> for ChannelWatcher<T> {
    fn recv(&mut self) -> BoxFuture<'_, Option<WatchEvent<T>>> {
        Box::pin(self.rx.recv())
    }

    fn stop(&mut self) {
        self.rx.close();
    }
}

/// Producer half of a channel-backed watch.
#[derive(Clone)]
pub struct WatchSender<T> {
    tx: mpsc::Sender<WatchEvent<T>>,
}

impl<T: Send + 'static> WatchSender<T> {
    /// Deliver an event. Returns false once the consumer stopped or went away.
    pub async fn send(&self, event: WatchEvent<T>) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Whether the consumer has stopped the watch.
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves when the consumer stops the watch.
    pub async fn stopped(&self) {
        self.tx.closed().await
    }
}
