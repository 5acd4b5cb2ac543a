//! Composition root: groups, managers, informers and the client pool.
//!
//! ```text
//!  ClientPool ─► PoolListerWatcher ─► SharedInformer<K> ─► manager(K)
//!      ▲                                                     │
//!      └──── ApiServerConfigUpdate ◄── ApiServerConfigManager┘
//! ```
//!
//! Roles and bindings are mirrored into an [`RbacStore`] read by the
//! daemon's [`RuleResolver`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use shard_core::{
    DEFAULT_NAMESPACE, DataPartitionConfig, Endpoints, KUBERNETES_SERVICE_NAME, Resource, ShardConfig, StorageCluster,
    Tenant,
};
use shardgrid_bcast::{DrainLatch, registry};
use shardgrid_client::{ClientPool, ListOptions, PoolListerWatcher, ResourcePath, RestClient};
use shardgrid_partition::{
    API_SERVER_CONFIG_GROUP, ApiServerConfigManager, ApiServerConfigStore, ApiServerConfigUpdate,
    ApiServerManagerSettings, CLIENT_DRAIN_LATCH, DATA_PARTITION_GROUP, DataPartitionManager, FatalHook,
    STORAGE_CLUSTER_GROUP, SingletonGuard, StorageClusterAction, StorageClusterManager, TenantStorageMapper, claim,
};
use shardgrid_selector::rbac::{ClusterRole, ClusterRoleBinding, RbacStore, Role, RoleBinding, RuleResolver};
use shardgrid_watch::{DeletedObject, FnHandler, InformerFactory};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::status::StatusState;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

const SINGLETONS: [&str; 4] = [
    "storage-cluster-manager",
    "tenant-storage-mapper",
    "data-partition-manager",
    "api-server-config-manager",
];

pub struct Daemon<C> {
    config: ShardConfig,
    pool: Arc<ClientPool<C>>,
    informers: InformerFactory,
    storage_clusters: Arc<StorageClusterManager>,
    tenants: Arc<TenantStorageMapper>,
    data_partition: Arc<DataPartitionManager>,
    api_server: Arc<ApiServerConfigManager>,
    config_store: Arc<ApiServerConfigStore>,
    latch: Arc<DrainLatch>,
    rbac: Arc<RuleResolver>,
    ready: Arc<AtomicBool>,
    _singletons: Vec<SingletonGuard>,
}

impl<C: RestClient> Daemon<C> {
    /// Build every manager and register its informer. A second build in the
    /// same process is a fatal invariant violation.
    pub fn build(config: ShardConfig, pool: Arc<ClientPool<C>>, fatal: FatalHook) -> anyhow::Result<Self> {
        let mut singletons = Vec::with_capacity(SINGLETONS.len());
        for name in SINGLETONS {
            match claim(name) {
                Ok(guard) => singletons.push(guard),
                Err(err) => {
                    fatal(&err);
                    return Err(err.into());
                }
            }
        }

        let capacity = config.broadcast.capacity;
        let storage_group = registry::group::<StorageClusterAction>(STORAGE_CLUSTER_GROUP, capacity)?;
        let data_partition_group = registry::group::<DataPartitionConfig>(DATA_PARTITION_GROUP, capacity)?;
        let api_server_group = registry::group::<ApiServerConfigUpdate>(API_SERVER_CONFIG_GROUP, capacity)?;
        let latch = Arc::new(DrainLatch::new(CLIENT_DRAIN_LATCH));

        let config_store = Arc::new(ApiServerConfigStore::new());
        let storage_clusters = Arc::new(StorageClusterManager::new(storage_group).with_fatal_hook(fatal.clone()));
        let tenants = Arc::new(TenantStorageMapper::new().with_fatal_hook(fatal.clone()));
        let data_partition = Arc::new(
            DataPartitionManager::new(&config.partition.service_group_id, data_partition_group)
                .with_fatal_hook(fatal.clone()),
        );
        let api_server = Arc::new(
            ApiServerConfigManager::new(
                ApiServerManagerSettings::from(&config.partition),
                api_server_group,
                latch.clone(),
                config_store.hook(),
            )
            .with_fatal_hook(fatal),
        );

        let informers = InformerFactory::new();
        informers
            .informer_for::<StorageCluster>(Arc::new(PoolListerWatcher::new(
                pool.clone(),
                ResourcePath::core("v1", "storageclusters"),
            )))
            .add_event_handler(storage_clusters.clone());
        informers
            .informer_for::<Tenant>(Arc::new(PoolListerWatcher::new(
                pool.clone(),
                ResourcePath::core("v1", "tenants"),
            )))
            .add_event_handler(tenants.clone());
        informers
            .informer_for::<DataPartitionConfig>(Arc::new(PoolListerWatcher::new(
                pool.clone(),
                ResourcePath::core("v1", "datapartitionconfigs"),
            )))
            .add_event_handler(data_partition.clone());
        informers
            .informer_for::<Endpoints>(Arc::new(
                PoolListerWatcher::new(
                    pool.clone(),
                    ResourcePath::core("v1", "endpoints").in_namespace(DEFAULT_NAMESPACE),
                )
                .with_options(
                    ListOptions::default().with_field_selector(&format!("metadata.name={KUBERNETES_SERVICE_NAME}")),
                ),
            ))
            .add_event_handler(api_server.clone());

        let rbac_store = Arc::new(RbacStore::new());
        let rbac = Arc::new(
            RuleResolver::new(rbac_store.clone()).with_legacy_empty_tenant(config.rbac.legacy_empty_tenant),
        );
        mirror_rbac::<C, Role>(&informers, &pool, "roles", &rbac_store, RbacStore::put_role, RbacStore::remove_role);
        mirror_rbac::<C, ClusterRole>(
            &informers,
            &pool,
            "clusterroles",
            &rbac_store,
            RbacStore::put_cluster_role,
            RbacStore::remove_cluster_role,
        );
        mirror_rbac::<C, RoleBinding>(
            &informers,
            &pool,
            "rolebindings",
            &rbac_store,
            RbacStore::put_role_binding,
            RbacStore::remove_role_binding,
        );
        mirror_rbac::<C, ClusterRoleBinding>(
            &informers,
            &pool,
            "clusterrolebindings",
            &rbac_store,
            RbacStore::put_cluster_role_binding,
            RbacStore::remove_cluster_role_binding,
        );

        info!(
            service_group = %config.partition.service_group_id,
            capacity,
            legacy_empty_tenant = config.rbac.legacy_empty_tenant,
            "partition managers built"
        );
        Ok(Self {
            config,
            pool,
            informers,
            storage_clusters,
            tenants,
            data_partition,
            api_server,
            config_store,
            latch,
            rbac,
            ready: Arc::new(AtomicBool::new(false)),
            _singletons: singletons,
        })
    }

    /// Start the debouncer, the client pool, the informers, the sync
    /// watcher that flips readiness and the drain logger.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        // Join before the debouncer can broadcast.
        let updates = self.api_server.subscribe();
        handles.push(
            self.pool
                .clone()
                .run(updates, self.api_server.latch().clone(), shutdown.clone()),
        );
        handles.push(self.api_server.clone().start(shutdown.clone()));
        handles.extend(self.informers.start(shutdown.clone()));
        handles.push(tokio::spawn(log_drains(self.latch.clone(), shutdown.clone())));

        let api_server = self.api_server.clone();
        let ready = self.ready.clone();
        let sync_timeout = self.config.partition.sync_timeout();
        let mut stop = shutdown;
        handles.push(tokio::spawn(async move {
            tokio::select! {
                _ = stop.wait_for(|s| *s) => {}
                synced = api_server.wait_for_sync() => match synced {
                    Ok(()) => {
                        ready.store(true, Ordering::SeqCst);
                        info!("api server config synced, ready");
                    }
                    Err(e) => warn!(error = %e, timeout_secs = sync_timeout.as_secs(), "api server config never synced"),
                },
            }
        }));
        handles
    }

    pub fn status_state(&self) -> StatusState {
        StatusState {
            service_group_id: self.config.partition.service_group_id.clone(),
            storage_clusters: self.storage_clusters.clone(),
            tenants: self.tenants.clone(),
            data_partition: self.data_partition.clone(),
            api_server: self.api_server.clone(),
            config_store: self.config_store.clone(),
            latch: self.latch.clone(),
            rbac: self.rbac.clone(),
            clients: self.pool.clone(),
            ready: self.ready.clone(),
        }
    }
}

/// Keep `store` in step with the informer for one RBAC kind.
fn mirror_rbac<C: RestClient, T: Resource + serde::de::DeserializeOwned>(
    informers: &InformerFactory,
    pool: &Arc<ClientPool<C>>,
    resource: &str,
    store: &Arc<RbacStore>,
    put: fn(&RbacStore, T),
    remove: fn(&RbacStore, &T),
) {
    let (on_add, on_update, on_delete) = (store.clone(), store.clone(), store.clone());
    let handler = FnHandler::new()
        .with_add(move |obj: &T| put(&on_add, obj.clone()))
        .with_update(move |old: &T, new: &T| {
            remove(&on_update, old);
            put(&on_update, new.clone());
        })
        .with_delete(move |obj: &DeletedObject<T>| remove(&on_delete, obj.object()));
    informers
        .informer_for::<T>(Arc::new(PoolListerWatcher::new(
            pool.clone(),
            ResourcePath::grouped(RBAC_GROUP, "v1", resource),
        )))
        .add_event_handler(Arc::new(handler));
}

/// Log each time the client pool finishes reacting to a config update.
async fn log_drains(latch: Arc<DrainLatch>, mut shutdown: watch::Receiver<bool>) {
    let mut pending = latch.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.wait_for(|s| *s) => return,
            armed = pending.wait_for(|c| *c > 0) => if armed.is_err() { return },
        }
        tokio::select! {
            _ = shutdown.wait_for(|s| *s) => return,
            drained = pending.wait_for(|c| *c == 0) => match drained {
                Ok(_) => info!("client pool drained after api server config update"),
                Err(_) => return,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use shard_core::{EndpointAddress, EndpointSubset, ObjectMeta};
    use shardgrid_client::{ClientFactory, ClientResult, FakeRestClient, PoolSettings};
    use shardgrid_partition::RecordingHook;

    /// Daemons claim process-wide singletons; tests building one take turns.
    static BUILD: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    fn pool() -> Arc<ClientPool<FakeRestClient>> {
        let factory: ClientFactory<FakeRestClient> =
            Arc::new(|url: &str| -> ClientResult<FakeRestClient> { Ok(FakeRestClient::new(url)) });
        Arc::new(ClientPool::new(
            PoolSettings::default(),
            factory,
            FakeRestClient::new("http://bootstrap:8080"),
        ))
    }

    fn api_server_endpoints(rv: u64, groups: &[(&str, &str)]) -> Endpoints {
        Endpoints {
            metadata: ObjectMeta::named(KUBERNETES_SERVICE_NAME)
                .in_namespace("system", DEFAULT_NAMESPACE)
                .with_resource_version(rv),
            subsets: groups
                .iter()
                .map(|(group, ip)| EndpointSubset {
                    addresses: vec![EndpointAddress {
                        ip: ip.to_string(),
                        hostname: String::new(),
                    }],
                    ports: vec![],
                    service_group_id: group.to_string(),
                })
                .collect(),
        }
    }

    async fn stop(shutdown_tx: watch::Sender<bool>, handles: Vec<JoinHandle<()>>) {
        shutdown_tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn second_daemon_is_fatal() {
        let _turn = BUILD.lock().await;
        let hook = RecordingHook::new();
        let first = Daemon::build(ShardConfig::default(), pool(), hook.hook()).unwrap();
        assert!(!hook.fired());

        assert!(Daemon::build(ShardConfig::default(), pool(), hook.hook()).is_err());
        assert_eq!(
            hook.calls(),
            vec!["storage-cluster-manager constructed more than once in this process"]
        );

        drop(first);
        assert!(Daemon::build(ShardConfig::default(), pool(), hook.hook()).is_ok());
    }

    #[tokio::test]
    async fn informers_sync_through_the_pool() {
        let _turn = BUILD.lock().await;
        let hook = RecordingHook::new();
        let pool = pool();
        let daemon = Daemon::build(ShardConfig::default(), pool.clone(), hook.hook()).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = daemon.start(shutdown_rx);
        assert!(daemon.informers.wait_for_cache_sync(std::time::Duration::from_secs(5)).await);

        let state = daemon.status_state();
        assert!(!state.ready.load(Ordering::SeqCst));
        assert_eq!(state.clients.snapshot().count, 1);

        stop(shutdown_tx, handles).await;
        assert!(!hook.fired());
    }

    #[tokio::test]
    async fn rbac_config_reaches_the_resolver() {
        let _turn = BUILD.lock().await;
        let hook = RecordingHook::new();

        let daemon = Daemon::build(ShardConfig::default(), pool(), hook.hook()).unwrap();
        assert!(daemon.rbac.legacy_empty_tenant());
        drop(daemon);

        let mut config = ShardConfig::default();
        config.rbac.legacy_empty_tenant = false;
        let daemon = Daemon::build(config, pool(), hook.hook()).unwrap();
        assert!(!daemon.rbac.legacy_empty_tenant());
        assert!(!daemon.status_state().rbac.legacy_empty_tenant());
        assert!(!hook.fired());
    }

    #[tokio::test]
    async fn config_update_drains_the_latch() {
        let _turn = BUILD.lock().await;
        let hook = RecordingHook::new();
        let pool = pool();
        let mut config = ShardConfig::default();
        config.partition.startup_debounce_secs = 0;
        let daemon = Daemon::build(config, pool.clone(), hook.hook()).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = daemon.start(shutdown_rx);
        assert!(
            daemon
                .api_server
                .observe(&api_server_endpoints(1, &[("1", "10.0.0.1"), ("2", "10.0.0.2")]))
                .unwrap()
        );

        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.generation() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(daemon.config_store.generation(), 1);
        assert!(daemon.latch.wait_timeout(Duration::from_secs(5)).await);
        assert_eq!(daemon.latch.pending(), 0);

        let state = daemon.status_state();
        assert_eq!(state.clients.snapshot().count, 2);
        assert_eq!(state.latch.pending(), 0);

        stop(shutdown_tx, handles).await;
        assert!(!hook.fired());
    }
}
