//! shardgrid-partition — the control plane's configuration managers.
//!
//! Each manager consumes informer events for one resource kind, keeps a
//! lock-guarded view of it, and announces accepted changes on its own
//! broadcast group. Managers never hold each other's locks.
//!
//! # Managers
//!
//! - **`storage_cluster`** — [`StorageClusterManager`], storage cluster
//!   id → cluster, publishing ADD/UPDATE/DELETE actions
//! - **`tenant_mapper`** — [`TenantStorageMapper`], tenant → storage
//!   cluster id, immutable once assigned
//! - **`data_partition`** — [`DataPartitionManager`], the key range this
//!   service group serves
//! - **`api_server`** — [`ApiServerConfigManager`], service group →
//!   API-server endpoints, debounced at startup
//!
//! Revisions are enforced per object: an event whose resource version is
//! not newer than the last one applied for the same identity is dropped.
//!
//! Invariant violations that cannot be repaired in-process go to a
//! [`FatalHook`]; the default hook exits the process.

pub mod api_server;
pub mod config_store;
pub mod data_partition;
pub mod error;
pub mod fatal;
pub mod singleton;
pub mod storage_cluster;
pub mod tenant_mapper;

pub use api_server::{
    API_SERVER_CONFIG_GROUP, ApiServerConfigManager, ApiServerConfigUpdate, ApiServerManagerSettings,
    CLIENT_DRAIN_LATCH,
};
pub use config_store::{ApiServerConfigStore, ConfigHook, EndpointMap, endpoint_urls};
pub use data_partition::{DATA_PARTITION_GROUP, DataPartitionManager};
pub use error::{PartitionError, PartitionResult};
pub use fatal::{FatalHook, RecordingHook, exit_process};
pub use singleton::{SingletonGuard, claim};
pub use storage_cluster::{
    ClusterAction, STORAGE_CLUSTER_GROUP, StorageClusterAction, StorageClusterManager,
};
pub use tenant_mapper::{TenantAssignment, TenantStorageMapper};
