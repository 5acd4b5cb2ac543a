//! In-memory lister/watcher for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use shard_core::WatchEvent;
use tokio::sync::watch;

use crate::BoxFuture;
use crate::error::{WatchError, WatchResult};
use crate::informer::{ListerWatcher, ObjectList};
use crate::interface::{BoxWatch, WatchSender, channel_watch};

const WATCH_BUFFER: usize = 16;

/// A [`ListerWatcher`] backed by a fixed list and a test-driven watch.
pub struct FakeListerWatcher<T> {
    kind: &'static str,
    list: Mutex<ObjectList<T>>,
    current: Mutex<Option<WatchSender<T>>>,
    watched: Mutex<Vec<String>>,
    watches: watch::Sender<usize>,
    list_failures: AtomicUsize,
    lists: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> FakeListerWatcher<T> {
    pub fn new(items: Vec<T>, resource_version: &str) -> Self {
        let (watches, _) = watch::channel(0);
        Self {
            kind: "fake",
            list: Mutex::new(ObjectList {
                items,
                resource_version: resource_version.to_string(),
            }),
            current: Mutex::new(None),
            watched: Mutex::new(Vec::new()),
            watches,
            list_failures: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
        }
    }

    /// Replace what the next list returns.
    pub fn set_items(&self, items: Vec<T>, resource_version: &str) {
        *self.list.lock().expect("fake list lock") = ObjectList {
            items,
            resource_version: resource_version.to_string(),
        };
    }

    /// Make the next `n` list calls fail.
    pub fn fail_next_lists(&self, n: usize) {
        self.list_failures.store(n, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Resource versions passed to `watch`, in call order.
    pub fn watched_versions(&self) -> Vec<String> {
        self.watched.lock().expect("fake watched lock").clone()
    }

    /// Wait until `n` watches have been opened in total.
    pub async fn wait_for_watch(&self, n: usize) {
        let mut rx = self.watches.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// Deliver an event on the current watch, waiting for one to be open.
    /// Returns false if the consumer stopped it before delivery.
    pub async fn emit(&self, event: WatchEvent<T>) -> bool {
        let mut rx = self.watches.subscribe();
        loop {
            let open = self
                .current
                .lock()
                .expect("fake current lock")
                .clone()
                .filter(|tx| !tx.is_stopped());
            if let Some(tx) = open {
                return tx.send(event).await;
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// End the current watch stream from the server side.
    pub fn close_watch(&self) {
        self.current.lock().expect("fake current lock").take();
    }
}

impl<T: Clone + Send + Sync + 'static> ListerWatcher<T> for FakeListerWatcher<T> {
    fn list(&self) -> BoxFuture<'_, WatchResult<ObjectList<T>>> {
        Box::pin(async move {
            self.lists.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .list_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(WatchError::List {
                    kind: self.kind,
                    message: "injected failure".to_string(),
                });
            }
            Ok(self.list.lock().expect("fake list lock").clone())
        })
    }

    fn watch(&self, resource_version: String) -> BoxFuture<'_, WatchResult<BoxWatch<T>>> {
        Box::pin(async move {
            let (watcher, tx) = channel_watch(WATCH_BUFFER);
            self.watched
                .lock()
                .expect("fake watched lock")
                .push(resource_version);
            *self.current.lock().expect("fake current lock") = Some(tx);
            self.watches.send_modify(|n| *n += 1);
            Ok(Box::new(watcher) as BoxWatch<T>)
        })
    }
}
