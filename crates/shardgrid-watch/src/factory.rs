//! One informer per resource kind, shared by every consumer in the process.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shard_core::Resource;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::informer::{ListerWatcher, SharedInformer};

/// Type-erased view of a [`SharedInformer`].
trait RunnableInformer: Send + Sync {
    fn kind(&self) -> &'static str;
    fn has_synced(&self) -> bool;
    fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()>;
}

impl<T: Resource> RunnableInformer for SharedInformer<T> {
    fn kind(&self) -> &'static str {
        SharedInformer::kind(self)
    }

    fn has_synced(&self) -> bool {
        SharedInformer::has_synced(self)
    }

    fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        self.run(shutdown)
    }
}

struct Entry {
    typed: Arc<dyn Any + Send + Sync>,
    runnable: Arc<dyn RunnableInformer>,
    started: bool,
}

#[derive(Default)]
pub struct InformerFactory {
    entries: Mutex<HashMap<TypeId, Entry>>,
}

impl InformerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The informer for `T`, created from `lw` on first request. Later
    /// requests return the same informer and ignore `lw`.
    pub fn informer_for<T: Resource>(&self, lw: Arc<dyn ListerWatcher<T>>) -> Arc<SharedInformer<T>> {
        let mut entries = self.entries.lock().expect("factory entries lock");
        if let Some(existing) = entries.get(&TypeId::of::<T>()) {
            if let Ok(informer) = Arc::clone(&existing.typed).downcast::<SharedInformer<T>>() {
                return informer;
            }
        }

        let informer = Arc::new(SharedInformer::new(lw));
        entries.insert(
            TypeId::of::<T>(),
            Entry {
                typed: informer.clone(),
                runnable: informer.clone(),
                started: false,
            },
        );
        informer
    }

    /// Start every informer not yet running. Safe to call again after
    /// registering more informers.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut entries = self.entries.lock().expect("factory entries lock");
        let mut handles = Vec::new();
        for entry in entries.values_mut().filter(|e| !e.started) {
            entry.started = true;
            info!(kind = entry.runnable.kind(), "starting informer");
            handles.push(Arc::clone(&entry.runnable).start(shutdown.clone()));
        }
        handles
    }

    /// Wait until every registered informer has synced. Returns false if
    /// `timeout` elapses first.
    pub async fn wait_for_cache_sync(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let pending: Vec<&'static str> = self
                .entries
                .lock()
                .expect("factory entries lock")
                .values()
                .filter(|e| !e.runnable.has_synced())
                .map(|e| e.runnable.kind())
                .collect();
            if pending.is_empty() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(pending = ?pending, "informer caches did not sync in time");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeListerWatcher;
    use shard_core::{StorageCluster, Tenant};

    #[tokio::test]
    async fn same_kind_shares_one_informer() {
        let factory = InformerFactory::new();
        let a = factory.informer_for::<Tenant>(Arc::new(FakeListerWatcher::<Tenant>::new(vec![], "1")));
        let b = factory.informer_for::<Tenant>(Arc::new(FakeListerWatcher::<Tenant>::new(vec![], "2")));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn start_and_sync_all_kinds() {
        let factory = InformerFactory::new();
        let tenants = factory.informer_for::<Tenant>(Arc::new(FakeListerWatcher::new(
            vec![Tenant::new("acme", "1", 1)],
            "1",
        )));
        let clusters = factory.informer_for::<StorageCluster>(Arc::new(FakeListerWatcher::new(
            vec![StorageCluster::new("c1", "1", "10.0.0.1", 1)],
            "1",
        )));

        let (tx, rx) = watch::channel(false);
        let handles = factory.start(rx.clone());
        assert_eq!(handles.len(), 2);
        assert!(factory.start(rx).is_empty());

        assert!(factory.wait_for_cache_sync(Duration::from_secs(1)).await);
        assert_eq!(tenants.keys(), vec!["acme"]);
        assert_eq!(clusters.list().len(), 1);

        tx.send(true).unwrap();
        for h in handles {
            h.await.unwrap();
        }
    }

    #[tokio::test]
    async fn sync_times_out_when_list_keeps_failing() {
        let factory = InformerFactory::new();
        let lw = Arc::new(FakeListerWatcher::<Tenant>::new(vec![], "1"));
        lw.fail_next_lists(usize::MAX);
        factory.informer_for::<Tenant>(lw);

        let (_tx, rx) = watch::channel(false);
        let _handles = factory.start(rx);
        assert!(!factory.wait_for_cache_sync(Duration::from_millis(100)).await);
    }
}
