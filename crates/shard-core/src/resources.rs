//! Configuration resources watched by the partition managers.
//!
//! All of these are cluster-scoped except `Endpoints`, which lives in
//! tenant `system`, namespace `default`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::meta::{ObjectMeta, Resource};

/// Storage cluster id reserved for the system tenant and unknown tenants.
pub const SYSTEM_STORAGE_CLUSTER_ID: u8 = 0;

/// Name of the endpoints object that lists API-server groups.
pub const KUBERNETES_SERVICE_NAME: &str = "kubernetes";

/// Namespace holding the API-server endpoints object.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Parse a storage cluster id string into its numeric form.
pub fn parse_storage_cluster_id(id: &str) -> CoreResult<u8> {
    id.trim()
        .parse::<u8>()
        .map_err(|_| CoreError::StorageClusterId(id.to_string()))
}

// ── StorageCluster ─────────────────────────────────────────────────

/// A backing key-value store instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageCluster {
    pub metadata: ObjectMeta,
    pub storage_cluster_id: String,
    pub service_address: String,
}

impl StorageCluster {
    pub fn new(name: &str, id: &str, address: &str, rv: u64) -> Self {
        Self {
            metadata: ObjectMeta::named(name).with_resource_version(rv),
            storage_cluster_id: id.to_string(),
            service_address: address.to_string(),
        }
    }

    /// Numeric storage cluster id.
    pub fn cluster_id(&self) -> CoreResult<u8> {
        parse_storage_cluster_id(&self.storage_cluster_id)
    }

    /// Service addresses of this cluster, split on commas.
    pub fn server_addresses(&self) -> Vec<String> {
        self.service_address
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Resource for StorageCluster {
    const KIND: &'static str = "StorageCluster";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// ── DataPartitionConfig ────────────────────────────────────────────

/// Range of tenant names one API-server service group is responsible for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct DataPartitionConfig {
    pub metadata: ObjectMeta,
    pub service_group_id: String,
    pub range_start: String,
    pub is_range_start_valid: bool,
    pub range_end: String,
    pub is_range_end_valid: bool,
}

impl DataPartitionConfig {
    /// Whether the four range fields are equal (metadata ignored).
    pub fn same_range(&self, other: &DataPartitionConfig) -> bool {
        self.range_start == other.range_start
            && self.is_range_start_valid == other.is_range_start_valid
            && self.range_end == other.range_end
            && self.is_range_end_valid == other.is_range_end_valid
    }

    /// Whether `key` falls inside `[rangeStart, rangeEnd)`.
    ///
    /// A bound whose validity flag is false is open.
    pub fn contains(&self, key: &str) -> bool {
        if self.is_range_start_valid && key < self.range_start.as_str() {
            return false;
        }
        if self.is_range_end_valid && key >= self.range_end.as_str() {
            return false;
        }
        true
    }
}

impl Resource for DataPartitionConfig {
    const KIND: &'static str = "DataPartitionConfig";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// ── Tenant ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct TenantSpec {
    pub storage_cluster_id: String,
}

/// A tenant object. Its name is the tenant name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Tenant {
    pub metadata: ObjectMeta,
    pub spec: TenantSpec,
}

impl Tenant {
    pub fn new(name: &str, storage_cluster_id: &str, rv: u64) -> Self {
        Self {
            metadata: ObjectMeta::named(name).with_resource_version(rv),
            spec: TenantSpec {
                storage_cluster_id: storage_cluster_id.to_string(),
            },
        }
    }
}

impl Resource for Tenant {
    const KIND: &'static str = "Tenant";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// ── Endpoints ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointAddress {
    pub ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hostname: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointPort {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub port: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub protocol: String,
}

/// One group of addresses and ports. Each subset belongs to a service group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointSubset {
    pub addresses: Vec<EndpointAddress>,
    pub ports: Vec<EndpointPort>,
    pub service_group_id: String,
}

impl EndpointSubset {
    /// The first address is the load balancer for the service group.
    pub fn load_balancer(&self) -> Option<&EndpointAddress> {
        self.addresses.first()
    }

    /// `ip:port` of the load balancer, using the first declared port.
    pub fn load_balancer_endpoint(&self) -> Option<String> {
        let addr = self.load_balancer()?;
        match self.ports.first() {
            Some(p) => Some(match addr.ip.parse::<std::net::IpAddr>() {
                Ok(ip) => std::net::SocketAddr::new(ip, p.port).to_string(),
                Err(_) => format!("{}:{}", addr.ip, p.port),
            }),
            None => Some(addr.ip.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Endpoints {
    pub metadata: ObjectMeta,
    pub subsets: Vec<EndpointSubset>,
}

impl Resource for Endpoints {
    const KIND: &'static str = "Endpoints";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
