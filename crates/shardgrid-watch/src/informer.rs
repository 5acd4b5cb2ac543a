//! Shared informer — list, then watch, with a local cache.
//!
//! # Lifecycle
//!
//! ```text
//! list ──► replace cache ──► synced ──► watch(rv) ──► apply events
//!   ▲                                       │
//!   │       410 Gone / list or watch error  │ stream ended
//!   └──────────────(backoff)────────────────┤
//!                                           └──► watch(last rv)
//! ```
//!
//! Handlers are called from the run task while the handler list lock is
//! held, so a handler registered late sees a replay of the cache followed
//! by live events with no duplicates and no gaps. Handlers must not
//! register other handlers on the same informer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use shard_core::{Resource, WatchEvent, meta_tenant_namespace_key};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::BoxFuture;
use crate::error::{WatchError, WatchResult};
use crate::handler::{DeletedObject, ResourceEventHandler};
use crate::interface::BoxWatch;

/// Status code an API server uses for an expired resource version.
const GONE: u16 = 410;

const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Result of a list call: the items and the version to watch from.
#[derive(Debug, Clone)]
pub struct ObjectList<T> {
    pub items: Vec<T>,
    pub resource_version: String,
}

/// Source of truth for an informer.
pub trait ListerWatcher<T>: Send + Sync + 'static {
    fn list(&self) -> BoxFuture<'_, WatchResult<ObjectList<T>>>;

    /// Start a watch from `resource_version` (exclusive).
    fn watch(&self, resource_version: String) -> BoxFuture<'_, WatchResult<BoxWatch<T>>>;
}

type HandlerList<T> = Vec<Arc<dyn ResourceEventHandler<T>>>;

pub struct SharedInformer<T> {
    lw: Arc<dyn ListerWatcher<T>>,
    store: RwLock<HashMap<String, T>>,
    handlers: Mutex<HandlerList<T>>,
    synced: watch::Sender<bool>,
    backoff: Duration,
}

impl<T: Resource> SharedInformer<T> {
    pub fn new(lw: Arc<dyn ListerWatcher<T>>) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            lw,
            store: RwLock::new(HashMap::new()),
            handlers: Mutex::new(Vec::new()),
            synced,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Delay between a failed list/watch and the next attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn kind(&self) -> &'static str {
        T::KIND
    }

    /// Register a handler. If the cache has already synced the handler
    /// immediately receives an add for every cached object.
    pub fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler<T>>) {
        let mut handlers = self.handlers.lock().expect("informer handlers lock");
        if self.has_synced() {
            let store = self.store.read().expect("informer store lock");
            for obj in store.values() {
                handler.on_add(obj);
            }
        }
        handlers.push(handler);
    }

    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Wait until the first list has been applied. Returns false on timeout.
    pub async fn wait_for_sync(&self, timeout: Duration) -> bool {
        let mut rx = self.synced.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|s| *s))
            .await
            .is_ok_and(|r| r.is_ok())
    }

    // ── Lister ─────────────────────────────────────────────────────

    /// Look up a cached object by its tenant/namespace/name key.
    pub fn get(&self, key: &str) -> Option<T> {
        self.store
            .read()
            .expect("informer store lock")
            .get(key)
            .cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.store
            .read()
            .expect("informer store lock")
            .values()
            .cloned()
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .store
            .read()
            .expect("informer store lock")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    // ── Run loop ───────────────────────────────────────────────────

    /// Spawn the list/watch loop. It runs until `shutdown` becomes true or
    /// its sender is dropped.
    pub fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(kind = T::KIND, "informer started");
            loop {
                let listed = tokio::select! {
                    _ = cancelled(&mut shutdown) => break,
                    r = self.lw.list() => r,
                };
                let list = match listed {
                    Ok(list) => list,
                    Err(e) => {
                        warn!(kind = T::KIND, error = %e, "list failed, retrying");
                        if self.pause(&mut shutdown).await {
                            break;
                        }
                        continue;
                    }
                };

                debug!(
                    kind = T::KIND,
                    items = list.items.len(),
                    resource_version = %list.resource_version,
                    "list applied"
                );
                self.replace(list.items);
                self.synced.send_replace(true);

                match self.watch_from(list.resource_version, &mut shutdown).await {
                    WatchExit::Shutdown => break,
                    WatchExit::Relist => {
                        if self.pause(&mut shutdown).await {
                            break;
                        }
                    }
                }
            }
            info!(kind = T::KIND, "informer stopped");
        })
    }

    /// Watch from `rv`, re-establishing the stream whenever it ends, until
    /// a relist is needed or shutdown.
    async fn watch_from(&self, mut rv: String, shutdown: &mut watch::Receiver<bool>) -> WatchExit {
        loop {
            let opened = tokio::select! {
                _ = cancelled(shutdown) => return WatchExit::Shutdown,
                r = self.lw.watch(rv.clone()) => r,
            };
            let mut stream = match opened {
                Ok(stream) => stream,
                Err(WatchError::Expired(v)) => {
                    debug!(kind = T::KIND, resource_version = %v, "watch expired, relisting");
                    return WatchExit::Relist;
                }
                Err(e) => {
                    warn!(kind = T::KIND, error = %e, "watch failed, relisting");
                    return WatchExit::Relist;
                }
            };

            let mut received = 0usize;
            loop {
                let event = tokio::select! {
                    _ = cancelled(shutdown) => {
                        stream.stop();
                        return WatchExit::Shutdown;
                    }
                    ev = stream.recv() => ev,
                };
                match event {
                    None if received == 0 => {
                        debug!(kind = T::KIND, resource_version = %rv, "watch closed empty, relisting");
                        return WatchExit::Relist;
                    }
                    None => {
                        debug!(kind = T::KIND, resource_version = %rv, "watch closed, rewatching");
                        break;
                    }
                    Some(WatchEvent::Error(status)) => {
                        stream.stop();
                        if status.code == GONE {
                            debug!(kind = T::KIND, "resource version gone, relisting");
                        } else {
                            warn!(
                                kind = T::KIND,
                                code = status.code,
                                message = %status.message,
                                "watch error, relisting"
                            );
                        }
                        return WatchExit::Relist;
                    }
                    Some(event) => {
                        received += 1;
                        if let Some(obj) = event.object() {
                            let next = &obj.meta().resource_version;
                            if !next.is_empty() {
                                rv = next.clone();
                            }
                        }
                        self.apply(event);
                    }
                }
            }
        }
    }

    /// Sleep for the backoff. Returns true if shutdown fired meanwhile.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = cancelled(shutdown) => true,
            _ = tokio::time::sleep(self.backoff) => false,
        }
    }

    fn apply(&self, event: WatchEvent<T>) {
        let handlers = self.handlers.lock().expect("informer handlers lock");
        match event {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) => {
                let key = meta_tenant_namespace_key(obj.meta());
                let old = self
                    .store
                    .write()
                    .expect("informer store lock")
                    .insert(key, obj.clone());
                for h in handlers.iter() {
                    match &old {
                        Some(old) => h.on_update(old, &obj),
                        None => h.on_add(&obj),
                    }
                }
            }
            WatchEvent::Deleted(obj) => {
                let key = meta_tenant_namespace_key(obj.meta());
                self.store.write().expect("informer store lock").remove(&key);
                let deleted = DeletedObject::Object(obj);
                for h in handlers.iter() {
                    h.on_delete(&deleted);
                }
            }
            WatchEvent::Bookmark(_) | WatchEvent::Error(_) => {}
        }
    }

    /// Swap in a fresh list, emitting the difference to handlers.
    fn replace(&self, items: Vec<T>) {
        let handlers = self.handlers.lock().expect("informer handlers lock");
        let fresh: HashMap<String, T> = items
            .into_iter()
            .map(|obj| (meta_tenant_namespace_key(obj.meta()), obj))
            .collect();
        let old = std::mem::replace(
            &mut *self.store.write().expect("informer store lock"),
            fresh.clone(),
        );

        for (key, obj) in &fresh {
            match old.get(key) {
                None => handlers.iter().for_each(|h| h.on_add(obj)),
                Some(prev) if prev.meta().resource_version != obj.meta().resource_version => {
                    handlers.iter().for_each(|h| h.on_update(prev, obj))
                }
                Some(_) => {}
            }
        }
        for (key, prev) in old {
            if !fresh.contains_key(&key) {
                let deleted = DeletedObject::Tombstone {
                    key,
                    last_known: prev,
                };
                handlers.iter().for_each(|h| h.on_delete(&deleted));
            }
        }
    }
}

enum WatchExit {
    Shutdown,
    Relist,
}

/// Resolves once shutdown is requested or its sender is gone.
pub(crate) async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|s| *s).await;
}
