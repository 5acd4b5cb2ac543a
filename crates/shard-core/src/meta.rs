//! Object metadata shared by every resource kind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Standard metadata carried by every object.
///
/// Field names follow the control-plane JSON encoding (`camelCase`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    /// Owning tenant. Empty on objects written before tenants existed.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tenant: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uid: String,
    /// Opaque to clients, but numeric in practice; see [`ObjectMeta::revision`].
    #[serde(skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    /// Stable hash of the object identity, used for range partitioning.
    pub hash_key: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

/// Reference from a dependent object to its owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    pub hash_key: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
}

impl ObjectMeta {
    /// Metadata for a cluster-scoped object owned by the system tenant.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Set the resource version (builder style, mostly for tests and fakes).
    pub fn with_resource_version(mut self, rv: u64) -> Self {
        self.resource_version = rv.to_string();
        self
    }

    /// Set the tenant and namespace (builder style).
    pub fn in_namespace(mut self, tenant: &str, namespace: &str) -> Self {
        self.tenant = tenant.to_string();
        self.namespace = namespace.to_string();
        self
    }

    /// Parse the resource version as a revision number.
    ///
    /// Managers compare revisions numerically to enforce rev-monotonic
    /// processing.
    pub fn revision(&self, kind: &'static str) -> CoreResult<u64> {
        self.resource_version
            .parse::<u64>()
            .map_err(|_| CoreError::ResourceVersion {
                kind,
                name: self.name.clone(),
                value: self.resource_version.clone(),
            })
    }
}

/// A typed object known to the control plane.
pub trait Resource: Clone + Send + Sync + 'static {
    /// Kind name, as it appears in `ownerReferences` and log lines.
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Parsed resource version of this object.
    fn revision(&self) -> CoreResult<u64> {
        self.meta().revision(Self::KIND)
    }
}
