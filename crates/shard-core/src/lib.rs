//! shard-core — shared types for the shardgrid control plane.
//!
//! The control plane is split across several API-server groups. Tenants
//! are the top-level scope above namespaces, and every manager in the
//! workspace speaks in terms of the types defined here.
//!
//! # Modules
//!
//! - **`tenant`** — reserved tenant names and tenant-name checks
//! - **`meta`** — `ObjectMeta`, owner references, and the `Resource` trait
//! - **`resources`** — `StorageCluster`, `DataPartitionConfig`, `Tenant`, `Endpoints`
//! - **`event`** — watch events and API status payloads
//! - **`keys`** — tenant-aware cache keys
//! - **`config`** — `shardd.toml` parsing

pub mod config;
pub mod error;
pub mod event;
pub mod keys;
pub mod meta;
pub mod resources;
pub mod tenant;

pub use config::ShardConfig;
pub use error::{CoreError, CoreResult};
pub use event::{ApiStatus, EventType, WatchEvent};
pub use keys::{
    meta_namespace_key, meta_tenant_namespace_key, split_meta_tenant_key,
    split_meta_tenant_namespace_key,
};
pub use meta::{ObjectMeta, OwnerReference, Resource};
pub use resources::*;
pub use tenant::{TENANT_ALL, TENANT_NONE, TENANT_SYSTEM};
