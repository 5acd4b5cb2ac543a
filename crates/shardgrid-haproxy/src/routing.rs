//! Request classification with the same semantics as the rendered ACLs.
//!
//! Rules are evaluated in the order the reference template lists them:
//!
//! ```text
//! 1. partition_source_rule   source ip of a partition → its own backend
//! 2. rp_request_rule         nodes / leases           → resource partition
//! 3. tp_request_rule         tenant first letter      → tenant partition
//! 4. default_backend
//! ```
//!
//! The `regex` crate has no lookahead, so reserved tenants are excluded by
//! inspecting the captured tenant segment instead.

use std::net::IpAddr;

use regex::Regex;
use shard_core::tenant::is_reserved_tenant;

use crate::acl::{RESOURCE_ACLS, tenant_api_capture, tenant_apis_capture};
use crate::error::HaproxyResult;
use crate::partition::PartitionLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// 1-based tenant partition index.
    TenantPartition(usize),
    ResourcePartition,
    /// No rule matched; the template's `default_backend` applies.
    Default,
}

pub struct RoutingTable {
    layout: PartitionLayout,
    resource: Vec<Regex>,
    tenant: [Regex; 2],
}

impl RoutingTable {
    pub fn new(layout: PartitionLayout) -> HaproxyResult<Self> {
        let resource = RESOURCE_ACLS
            .iter()
            .map(|(_, pattern)| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            layout,
            resource,
            tenant: [Regex::new(&tenant_api_capture())?, Regex::new(&tenant_apis_capture())?],
        })
    }

    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    /// Classify a request. `path` may carry a query string.
    pub fn route(&self, path: &str, source: Option<IpAddr>) -> Route {
        let path = path.split_once('?').map_or(path, |(p, _)| p);

        if let Some(ip) = source {
            if let Some(tp) = self.layout.tenant_partitions.iter().find(|tp| tp.ip == ip) {
                return Route::TenantPartition(tp.index);
            }
            if ip == self.layout.resource_partition {
                return Route::ResourcePartition;
            }
        }

        if self.resource.iter().any(|re| re.is_match(path)) {
            return Route::ResourcePartition;
        }

        self.tenant_of(path)
            .filter(|tenant| !is_reserved_tenant(tenant))
            .and_then(|tenant| self.layout.tenant_partition_for(tenant))
            .map_or(Route::Default, |tp| Route::TenantPartition(tp.index))
    }

    fn tenant_of<'p>(&self, path: &'p str) -> Option<&'p str> {
        self.tenant
            .iter()
            .find_map(|re| re.captures(path).and_then(|caps| caps.get(1)))
            .map(|rest| rest.as_str().split('/').next().unwrap_or_default())
    }
}
