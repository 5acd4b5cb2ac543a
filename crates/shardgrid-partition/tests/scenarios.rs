//! Manager scenarios driven end to end through a shared informer.

use std::sync::Arc;
use std::time::Duration;

use shard_core::{
    DEFAULT_NAMESPACE, EndpointAddress, EndpointSubset, Endpoints, KUBERNETES_SERVICE_NAME,
    ObjectMeta, StorageCluster, Tenant, WatchEvent,
};
use shardgrid_bcast::{BroadcastGroup, DrainLatch};
use shardgrid_partition::{
    API_SERVER_CONFIG_GROUP, ApiServerConfigManager, ApiServerConfigStore, ApiServerManagerSettings,
    CLIENT_DRAIN_LATCH, ClusterAction, RecordingHook, STORAGE_CLUSTER_GROUP, StorageClusterManager,
    TenantStorageMapper,
};
use shardgrid_watch::{FakeListerWatcher, SharedInformer};
use tokio::sync::watch;
use tokio::time::Instant;

fn api_endpoints(rv: u64, groups: &[(&str, &str)]) -> Endpoints {
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

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Endpoint A at T=0, A+B at T=5s: one rebuild broadcast at T≈30s
/// carrying both groups.
#[tokio::test(start_paused = true)]
async fn api_server_config_is_debounced_at_startup() {
    let group = Arc::new(BroadcastGroup::new(API_SERVER_CONFIG_GROUP, 8));
    let latch = Arc::new(DrainLatch::new(CLIENT_DRAIN_LATCH));
    let store = Arc::new(ApiServerConfigStore::new());
    let mgr = Arc::new(ApiServerConfigManager::new(
        ApiServerManagerSettings::default(),
        group.clone(),
        latch.clone(),
        store.hook(),
    ));
    let mut sub = group.join();

    let lw = Arc::new(FakeListerWatcher::<Endpoints>::new(vec![], "0"));
    let informer = Arc::new(SharedInformer::new(lw.clone()));
    informer.add_event_handler(mgr.clone());

    let (tx, rx) = watch::channel(false);
    let informer_task = informer.clone().run(rx.clone());
    let actor = mgr.clone().start(rx);

    let t0 = Instant::now();
    lw.emit(WatchEvent::Added(api_endpoints(1, &[("A", "10.0.0.1")])))
        .await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    lw.emit(WatchEvent::Modified(api_endpoints(
        2,
        &[("A", "10.0.0.1"), ("B", "10.0.0.2")],
    )))
    .await;

    let update = sub.read().await.expect("config update");
    let at = t0.elapsed();
    assert!(
        at >= Duration::from_secs(30) && at < Duration::from_secs(31),
        "broadcast at {at:?}"
    );
    assert_eq!(
        update.message.endpoints.keys().collect::<Vec<_>>(),
        vec!["A", "B"]
    );

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(sub.try_read().is_none(), "exactly one broadcast expected");
    assert_eq!(store.generation(), 1);
    assert_eq!(latch.pending(), 1);

    tx.send(true).unwrap();
    informer_task.await.unwrap();
    actor.await.unwrap();
}

#[tokio::test]
async fn storage_cluster_add_update_delete() {
    let hook = RecordingHook::new();
    let mgr = Arc::new(
        StorageClusterManager::new(Arc::new(BroadcastGroup::new(STORAGE_CLUSTER_GROUP, 16)))
            .with_fatal_hook(hook.hook()),
    );
    let mut actions = mgr.subscribe();

    let lw = Arc::new(FakeListerWatcher::new(
        vec![StorageCluster::new("cluster-1", "1", "10.1.0.1", 100)],
        "100",
    ));
    let informer = Arc::new(SharedInformer::new(lw.clone()));
    informer.add_event_handler(mgr.clone());
    let (tx, rx) = watch::channel(false);
    let task = informer.clone().run(rx);
    assert!(informer.wait_for_sync(Duration::from_secs(1)).await);

    lw.emit(WatchEvent::Modified(StorageCluster::new("cluster-1", "1", "10.1.0.1", 99)))
        .await;
    settle().await;
    assert_eq!(mgr.get(1).unwrap().metadata.resource_version, "100");

    mgr.update(
        &StorageCluster::new("cluster-1", "1", "10.1.0.1", 100),
        &StorageCluster::new("cluster-2", "1", "10.1.0.1", 101),
    )
    .unwrap();
    assert_eq!(mgr.get(1).unwrap().metadata.name, "cluster-2");

    lw.emit(WatchEvent::Deleted(StorageCluster::new("other", "2", "10.2.0.1", 105)))
        .await;
    settle().await;
    assert_eq!(mgr.len(), 1);

    lw.emit(WatchEvent::Deleted(StorageCluster::new("cluster-2", "1", "10.1.0.1", 110)))
        .await;
    settle().await;
    assert!(mgr.is_empty());
    assert!(!hook.fired());

    let seen: Vec<ClusterAction> = std::iter::from_fn(|| actions.try_read())
        .map(|e| e.message.action)
        .collect();
    assert_eq!(seen, vec![ClusterAction::Add, ClusterAction::Delete]);

    tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn tenant_storage_assignment_is_immutable() {
    let mapper = Arc::new(TenantStorageMapper::new());
    let lw = Arc::new(FakeListerWatcher::new(vec![Tenant::new("t1", "1", 1)], "1"));
    let informer = Arc::new(SharedInformer::new(lw.clone()));
    informer.add_event_handler(mapper.clone());
    let (tx, rx) = watch::channel(false);
    let task = informer.clone().run(rx);
    assert!(informer.wait_for_sync(Duration::from_secs(1)).await);

    lw.emit(WatchEvent::Modified(Tenant::new("t1", "2", 100))).await;
    settle().await;

    assert_eq!(mapper.cluster_id_for("t1"), 1);
    assert_eq!(mapper.rev(), 100);

    tx.send(true).unwrap();
    task.await.unwrap();
}
