//! Typed list/watch over a [`ClientPool`], for feeding shared informers.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use shard_core::{Resource, WatchEvent};
use shardgrid_watch::{
    BoxFuture, BoxWatch, ListerWatcher, ObjectList, WatchError, WatchInterface, WatchResult,
};
use tracing::warn;

use crate::pool::ClientPool;
use crate::request::{ListOptions, ResourcePath};
use crate::rest::RestClient;

pub struct PoolListerWatcher<C, T> {
    pool: Arc<ClientPool<C>>,
    path: ResourcePath,
    opts: ListOptions,
    _kind: PhantomData<fn() -> T>,
}

impl<C: RestClient, T: Resource + DeserializeOwned> PoolListerWatcher<C, T> {
    pub fn new(pool: Arc<ClientPool<C>>, path: ResourcePath) -> Self {
        Self {
            pool,
            path,
            opts: ListOptions::default(),
            _kind: PhantomData,
        }
    }

    pub fn with_options(mut self, opts: ListOptions) -> Self {
        self.opts = opts;
        self
    }
}

impl<C: RestClient, T: Resource + DeserializeOwned> ListerWatcher<T> for PoolListerWatcher<C, T> {
    fn list(&self) -> BoxFuture<'_, WatchResult<ObjectList<T>>> {
        Box::pin(async move {
            let failed = |message: String| WatchError::List {
                kind: T::KIND,
                message,
            };
            let list = self
                .pool
                .list(&self.path, &self.opts)
                .await
                .map_err(|e| failed(e.to_string()))?;
            let items = list
                .items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<Vec<T>, _>>()
                .map_err(|e| failed(e.to_string()))?;
            Ok(ObjectList {
                items,
                resource_version: list.resource_version,
            })
        })
    }

    fn watch(&self, resource_version: String) -> BoxFuture<'_, WatchResult<BoxWatch<T>>> {
        Box::pin(async move {
            let opts = self.opts.clone().with_resource_version(&resource_version);
            let watch = self
                .pool
                .watch(&self.path, &opts)
                .await
                .map_err(|e| WatchError::Watch {
                    kind: T::KIND,
                    message: e.to_string(),
                })?;
            let typed: BoxWatch<T> = Box::new(TypedWatch::<T>::new(Box::new(watch)));
            Ok(typed)
        })
    }
}

/// Decodes the objects of an untyped watch. Objects that do not decode
/// are logged and skipped.
pub struct TypedWatch<T> {
    inner: BoxWatch<Value>,
    _kind: PhantomData<fn() -> T>,
}

impl<T> TypedWatch<T> {
    pub fn new(inner: BoxWatch<Value>) -> Self {
        Self {
            inner,
            _kind: PhantomData,
        }
    }
}

impl<T: Resource + DeserializeOwned> WatchInterface<T> for TypedWatch<T> {
    fn recv(&mut self) -> BoxFuture<'_, Option<WatchEvent<T>>> {
        Box::pin(async move {
            loop {
                let event = self.inner.recv().await?;
                match decode_event(event) {
                    Ok(event) => return Some(event),
                    Err(e) => warn!(kind = T::KIND, error = %e, "undecodable watch object skipped"),
                }
            }
        })
    }

    fn stop(&mut self) {
        self.inner.stop();
    }
}

fn decode_event<T: DeserializeOwned>(event: WatchEvent<Value>) -> serde_json::Result<WatchEvent<T>> {
    Ok(match event {
        WatchEvent::Added(v) => WatchEvent::Added(serde_json::from_value(v)?),
        WatchEvent::Modified(v) => WatchEvent::Modified(serde_json::from_value(v)?),
        WatchEvent::Deleted(v) => WatchEvent::Deleted(serde_json::from_value(v)?),
        WatchEvent::Bookmark(v) => WatchEvent::Bookmark(serde_json::from_value(v)?),
        WatchEvent::Error(status) => WatchEvent::Error(status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeRestClient;
    use crate::pool::PoolSettings;
    use serde_json::json;
    use shard_core::StorageCluster;
    use shardgrid_watch::channel_watch;

    #[tokio::test]
    async fn typed_watch_skips_undecodable_objects() {
        let (watcher, tx) = channel_watch(4);
        let mut typed: TypedWatch<StorageCluster> = TypedWatch::new(Box::new(watcher));

        tx.send(WatchEvent::Added(json!("not an object"))).await;
        tx.send(WatchEvent::Added(json!({
            "metadata": {"name": "c1", "resourceVersion": "3"},
            "storageClusterId": "1",
            "serviceAddress": "10.0.0.1:2379"
        })))
        .await;
        drop(tx);

        match typed.recv().await {
            Some(WatchEvent::Added(c)) => assert_eq!(c.metadata.name, "c1"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(typed.recv().await.is_none());
    }

    #[tokio::test]
    async fn lists_decode_into_resources() {
        let bootstrap = FakeRestClient::new("http://bootstrap:8080");
        bootstrap.set_default_list(Ok(ObjectList {
            items: vec![json!({
                "metadata": {"name": "c1", "resourceVersion": "3"},
                "storageClusterId": "1",
                "serviceAddress": "10.0.0.1:2379"
            })],
            resource_version: "3".into(),
        }));
        let pool = Arc::new(ClientPool::new(
            PoolSettings::default(),
            Arc::new(|url: &str| -> crate::ClientResult<FakeRestClient> { Ok(FakeRestClient::new(url)) }),
            bootstrap,
        ));
        let lw: PoolListerWatcher<FakeRestClient, StorageCluster> =
            PoolListerWatcher::new(pool.clone(), ResourcePath::core("v1", "storageclusters"));

        let list = lw.list().await.unwrap();
        assert_eq!(list.resource_version, "3");
        assert_eq!(list.items[0].storage_cluster_id, "1");

        let _watch = lw.watch("3".into()).await.unwrap();
        let opts = pool.rest_clients()[0].watch_options();
        assert_eq!(opts[0].resource_version.as_deref(), Some("3"));
    }
}
