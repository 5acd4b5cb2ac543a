//! Cache keys.
//!
//! Namespaced objects key as `tenant/namespace/name`. When the tenant is
//! `system` (or empty) the tenant segment is dropped and the key collapses
//! to `namespace/name`, so single-tenant tooling keeps working unchanged.

use crate::error::{CoreError, CoreResult};
use crate::meta::ObjectMeta;
use crate::tenant::{TENANT_SYSTEM, is_system_tenant};

/// Key ignoring tenants: `namespace/name`, or `name` when cluster-scoped.
pub fn meta_namespace_key(meta: &ObjectMeta) -> String {
    if meta.namespace.is_empty() {
        meta.name.clone()
    } else {
        format!("{}/{}", meta.namespace, meta.name)
    }
}

/// Tenant-aware key.
///
/// | tenant | namespace | key |
/// |---|---|---|
/// | system / empty | set | `ns/name` |
/// | system / empty | empty | `name` |
/// | other | set | `tenant/ns/name` |
/// | other | empty | `tenant/name` |
pub fn meta_tenant_namespace_key(meta: &ObjectMeta) -> String {
    if is_system_tenant(&meta.tenant) {
        return meta_namespace_key(meta);
    }
    if meta.namespace.is_empty() {
        format!("{}/{}", meta.tenant, meta.name)
    } else {
        format!("{}/{}/{}", meta.tenant, meta.namespace, meta.name)
    }
}

/// Split a namespaced key into `(tenant, namespace, name)`.
///
/// Two segments are read as `namespace/name` in the system tenant; a single
/// segment is a cluster-scoped system object.
pub fn split_meta_tenant_namespace_key(key: &str) -> CoreResult<(String, String, String)> {
    let parts: Vec<&str> = key.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(CoreError::CacheKey(key.to_string()));
    }
    match parts.as_slice() {
        [name] => Ok((TENANT_SYSTEM.to_string(), String::new(), name.to_string())),
        [ns, name] => Ok((TENANT_SYSTEM.to_string(), ns.to_string(), name.to_string())),
        [tenant, ns, name] => Ok((tenant.to_string(), ns.to_string(), name.to_string())),
        _ => Err(CoreError::CacheKey(key.to_string())),
    }
}

/// Split a key of a tenant-scoped, non-namespaced object into `(tenant, name)`.
pub fn split_meta_tenant_key(key: &str) -> CoreResult<(String, String)> {
    let parts: Vec<&str> = key.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(CoreError::CacheKey(key.to_string()));
    }
    match parts.as_slice() {
        [name] => Ok((TENANT_SYSTEM.to_string(), name.to_string())),
        [tenant, name] => Ok((tenant.to_string(), name.to_string())),
        _ => Err(CoreError::CacheKey(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(tenant: &str, ns: &str, name: &str) -> ObjectMeta {
        ObjectMeta::named(name).in_namespace(tenant, ns)
    }

    #[test]
    fn system_tenant_collapses_to_namespace_key() {
        assert_eq!(meta_tenant_namespace_key(&meta("system", "kube", "p")), "kube/p");
        assert_eq!(meta_tenant_namespace_key(&meta("", "kube", "p")), "kube/p");
        assert_eq!(meta_tenant_namespace_key(&meta("system", "", "n1")), "n1");
    }

    #[test]
    fn other_tenants_keep_their_segment() {
        assert_eq!(meta_tenant_namespace_key(&meta("alice", "web", "p")), "alice/web/p");
        assert_eq!(meta_tenant_namespace_key(&meta("alice", "", "ns1")), "alice/ns1");
    }

    #[test]
    fn split_round_trips() {
        for m in [meta("alice", "web", "p"), meta("system", "kube", "p")] {
            let key = meta_tenant_namespace_key(&m);
            let (tenant, ns, name) = split_meta_tenant_namespace_key(&key).unwrap();
            assert_eq!(ns, m.namespace);
            assert_eq!(name, m.name);
            if m.tenant == "system" {
                assert_eq!(tenant, "system");
            } else {
                assert_eq!(tenant, m.tenant);
            }
        }
    }

    #[test]
    fn split_tenant_key() {
        assert_eq!(
            split_meta_tenant_key("alice/ns1").unwrap(),
            ("alice".to_string(), "ns1".to_string())
        );
        assert_eq!(
            split_meta_tenant_key("n1").unwrap(),
            ("system".to_string(), "n1".to_string())
        );
        assert!(split_meta_tenant_key("a/b/c").is_err());
    }

    #[test]
    fn split_rejects_malformed_keys() {
        assert!(split_meta_tenant_namespace_key("a/b/c/d").is_err());
        assert!(split_meta_tenant_namespace_key("a//c").is_err());
        assert!(split_meta_tenant_namespace_key("").is_err());
    }
}
