//! Status API.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | 200 once the API-server config synced, 503 before |
//! | GET | `/debug/partitions` | JSON snapshot of every manager and the client pool |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use shard_core::{DataPartitionConfig, StorageCluster};
use shardgrid_bcast::DrainLatch;
use shardgrid_client::{ClientPool, RestClient};
use shardgrid_partition::{
    ApiServerConfigManager, ApiServerConfigStore, DataPartitionManager, EndpointMap, StorageClusterManager,
    TenantStorageMapper,
};
use shardgrid_selector::rbac::{RbacCounts, RuleResolver};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientsSnapshot {
    pub count: usize,
    pub generation: u64,
    /// API-server group → base URL.
    pub targets: BTreeMap<String, String>,
}

/// Read-only view of a client pool, independent of its client type.
pub trait ClientView: Send + Sync {
    fn snapshot(&self) -> ClientsSnapshot;
}

impl<C: RestClient> ClientView for ClientPool<C> {
    fn snapshot(&self) -> ClientsSnapshot {
        ClientsSnapshot {
            count: self.len(),
            generation: self.generation(),
            targets: self.targets(),
        }
    }
}

#[derive(Clone)]
pub struct StatusState {
    pub service_group_id: String,
    pub storage_clusters: Arc<StorageClusterManager>,
    pub tenants: Arc<TenantStorageMapper>,
    pub data_partition: Arc<DataPartitionManager>,
    pub api_server: Arc<ApiServerConfigManager>,
    pub config_store: Arc<ApiServerConfigStore>,
    pub latch: Arc<DrainLatch>,
    pub rbac: Arc<RuleResolver>,
    pub clients: Arc<dyn ClientView>,
    pub ready: Arc<AtomicBool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionsSnapshot {
    pub service_group_id: String,
    pub ready: bool,
    pub storage_clusters: Vec<StorageCluster>,
    pub storage_cluster_rev: u64,
    pub tenants: BTreeMap<String, u8>,
    pub tenant_rev: u64,
    pub data_partition: Option<DataPartitionConfig>,
    /// Endpoints as last observed, before debouncing.
    pub api_servers: EndpointMap,
    /// Endpoints the client pool was last configured from.
    pub applied_api_servers: EndpointMap,
    pub clients: ClientsSnapshot,
    /// Client pools that have not yet rebuilt after the last update.
    pub drain_pending: usize,
    pub rbac: RbacSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RbacSnapshot {
    pub legacy_empty_tenant: bool,
    #[serde(flatten)]
    pub counts: RbacCounts,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/debug/partitions", get(partitions))
        .with_state(state)
}

/// GET /healthz
pub async fn healthz(State(state): State<StatusState>) -> impl IntoResponse {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "api server config not synced")
    }
}

/// GET /debug/partitions
pub async fn partitions(State(state): State<StatusState>) -> Json<PartitionsSnapshot> {
    Json(PartitionsSnapshot {
        service_group_id: state.service_group_id.clone(),
        ready: state.ready.load(Ordering::SeqCst),
        storage_clusters: state.storage_clusters.clusters(),
        storage_cluster_rev: state.storage_clusters.rev(),
        tenants: state.tenants.mapping(),
        tenant_rev: state.tenants.rev(),
        data_partition: state.data_partition.current(),
        api_servers: state.api_server.endpoints(),
        applied_api_servers: state.config_store.get(),
        clients: state.clients.snapshot(),
        drain_pending: state.latch.pending(),
        rbac: RbacSnapshot {
            legacy_empty_tenant: state.rbac.legacy_empty_tenant(),
            counts: state.rbac.store().counts(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shard_core::Tenant;
    use shardgrid_bcast::BroadcastGroup;
    use shardgrid_client::{ClientFactory, ClientResult, FakeRestClient, PoolSettings};
    use shardgrid_partition::{ApiServerManagerSettings, RecordingHook};
    use shardgrid_selector::rbac::RbacStore;

    fn state(hook: &RecordingHook) -> StatusState {
        let factory: ClientFactory<FakeRestClient> =
            Arc::new(|url: &str| -> ClientResult<FakeRestClient> { Ok(FakeRestClient::new(url)) });
        let pool = ClientPool::new(PoolSettings::default(), factory, FakeRestClient::new("http://bootstrap:8080"));
        let config_store = Arc::new(ApiServerConfigStore::new());
        let latch = Arc::new(DrainLatch::new("status-latch"));
        StatusState {
            service_group_id: "1".to_string(),
            storage_clusters: Arc::new(
                StorageClusterManager::new(Arc::new(BroadcastGroup::new("status-sc", 4))).with_fatal_hook(hook.hook()),
            ),
            tenants: Arc::new(TenantStorageMapper::new().with_fatal_hook(hook.hook())),
            data_partition: Arc::new(
                DataPartitionManager::new("1", Arc::new(BroadcastGroup::new("status-dp", 4)))
                    .with_fatal_hook(hook.hook()),
            ),
            api_server: Arc::new(
                ApiServerConfigManager::new(
                    ApiServerManagerSettings::default(),
                    Arc::new(BroadcastGroup::new("status-api", 4)),
                    latch.clone(),
                    config_store.hook(),
                )
                .with_fatal_hook(hook.hook()),
            ),
            config_store,
            latch,
            rbac: Arc::new(RuleResolver::new(Arc::new(RbacStore::new())).with_legacy_empty_tenant(false)),
            clients: Arc::new(pool),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    #[tokio::test]
    async fn healthz_follows_readiness() {
        let hook = RecordingHook::new();
        let state = state(&hook);

        let resp = healthz(State(state.clone())).await.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.ready.store(true, Ordering::SeqCst);
        let resp = healthz(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn partitions_snapshot() {
        let hook = RecordingHook::new();
        let state = state(&hook);
        state
            .storage_clusters
            .add(&StorageCluster::new("cluster-1", "1", "10.0.0.1", 100))
            .unwrap();
        state.tenants.add(&Tenant::new("acme", "1", 7)).unwrap();

        let Json(snapshot) = partitions(State(state)).await;
        assert_eq!(snapshot.service_group_id, "1");
        assert!(!snapshot.ready);
        assert_eq!(snapshot.storage_clusters.len(), 1);
        assert_eq!(snapshot.storage_cluster_rev, 100);
        assert_eq!(snapshot.tenants.get("acme"), Some(&1));
        assert_eq!(snapshot.tenant_rev, 7);
        assert!(snapshot.data_partition.is_none());
        assert_eq!(snapshot.clients.count, 1);
        assert_eq!(snapshot.clients.targets.get("bootstrap").map(String::as_str), Some("http://bootstrap:8080"));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("storageClusters").is_some());
        assert!(json.get("appliedApiServers").is_some());
        assert_eq!(json["drainPending"], 0);
        assert_eq!(json["rbac"]["legacyEmptyTenant"], false);
        assert_eq!(json["rbac"]["clusterRoleBindings"], 0);
        assert!(!hook.fired());
    }
}
