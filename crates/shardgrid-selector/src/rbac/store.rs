use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::Serialize;
use shard_core::Resource;

use super::types::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};

/// (tenant, namespace, name). Tenants are stored as written: the legacy
/// empty tenant stays distinct from `system`.
type Key = (String, String, String);

fn key_of<T: Resource>(obj: &T) -> Key {
    let meta = obj.meta();
    (meta.tenant.clone(), meta.namespace.clone(), meta.name.clone())
}

#[derive(Default)]
struct Objects {
    roles: BTreeMap<Key, Role>,
    cluster_roles: BTreeMap<Key, ClusterRole>,
    role_bindings: BTreeMap<Key, RoleBinding>,
    cluster_role_bindings: BTreeMap<Key, ClusterRoleBinding>,
}

/// Number of objects of each kind held by an [`RbacStore`].
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RbacCounts {
    pub roles: usize,
    pub cluster_roles: usize,
    pub role_bindings: usize,
    pub cluster_role_bindings: usize,
}

/// In-memory roles and bindings, fed from informers.
#[derive(Default)]
pub struct RbacStore {
    objects: RwLock<Objects>,
}

impl RbacStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_role(&self, role: Role) {
        let mut objects = self.objects.write().expect("rbac store lock");
        objects.roles.insert(key_of(&role), role);
    }

    pub fn put_cluster_role(&self, role: ClusterRole) {
        let mut objects = self.objects.write().expect("rbac store lock");
        objects.cluster_roles.insert(key_of(&role), role);
    }

    pub fn put_role_binding(&self, binding: RoleBinding) {
        let mut objects = self.objects.write().expect("rbac store lock");
        objects.role_bindings.insert(key_of(&binding), binding);
    }

    pub fn put_cluster_role_binding(&self, binding: ClusterRoleBinding) {
        let mut objects = self.objects.write().expect("rbac store lock");
        objects.cluster_role_bindings.insert(key_of(&binding), binding);
    }

    pub fn remove_role(&self, role: &Role) {
        self.objects.write().expect("rbac store lock").roles.remove(&key_of(role));
    }

    pub fn remove_cluster_role(&self, role: &ClusterRole) {
        self.objects.write().expect("rbac store lock").cluster_roles.remove(&key_of(role));
    }

    pub fn remove_role_binding(&self, binding: &RoleBinding) {
        self.objects.write().expect("rbac store lock").role_bindings.remove(&key_of(binding));
    }

    pub fn remove_cluster_role_binding(&self, binding: &ClusterRoleBinding) {
        self.objects
            .write()
            .expect("rbac store lock")
            .cluster_role_bindings
            .remove(&key_of(binding));
    }

    pub fn counts(&self) -> RbacCounts {
        let objects = self.objects.read().expect("rbac store lock");
        RbacCounts {
            roles: objects.roles.len(),
            cluster_roles: objects.cluster_roles.len(),
            role_bindings: objects.role_bindings.len(),
            cluster_role_bindings: objects.cluster_role_bindings.len(),
        }
    }

    pub fn role(&self, tenant: &str, namespace: &str, name: &str) -> Option<Role> {
        let key = (tenant.to_string(), namespace.to_string(), name.to_string());
        self.objects.read().expect("rbac store lock").roles.get(&key).cloned()
    }

    pub fn cluster_role(&self, tenant: &str, name: &str) -> Option<ClusterRole> {
        let key = (tenant.to_string(), String::new(), name.to_string());
        self.objects.read().expect("rbac store lock").cluster_roles.get(&key).cloned()
    }

    /// Cluster role bindings written in `tenant`.
    pub fn cluster_role_bindings(&self, tenant: &str) -> Vec<ClusterRoleBinding> {
        self.objects
            .read()
            .expect("rbac store lock")
            .cluster_role_bindings
            .iter()
            .filter(|((t, _, _), _)| t == tenant)
            .map(|(_, binding)| binding.clone())
            .collect()
    }

    /// Role bindings in `namespace` of `tenant`.
    pub fn role_bindings(&self, tenant: &str, namespace: &str) -> Vec<RoleBinding> {
        self.objects
            .read()
            .expect("rbac store lock")
            .role_bindings
            .iter()
            .filter(|((t, ns, _), _)| t == tenant && ns == namespace)
            .map(|(_, binding)| binding.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shard_core::ObjectMeta;

    fn cluster_role(tenant: &str, name: &str) -> ClusterRole {
        let mut metadata = ObjectMeta::named(name);
        metadata.tenant = tenant.to_string();
        ClusterRole {
            metadata,
            rules: Vec::new(),
        }
    }

    #[test]
    fn empty_tenant_is_kept_apart_from_system() {
        let store = RbacStore::new();
        store.put_cluster_role(cluster_role("", "admin"));
        store.put_cluster_role(cluster_role("system", "view"));

        assert!(store.cluster_role("", "admin").is_some());
        assert!(store.cluster_role("system", "admin").is_none());
        assert!(store.cluster_role("system", "view").is_some());

        store.remove_cluster_role(&cluster_role("", "admin"));
        assert!(store.cluster_role("", "admin").is_none());
    }

    #[test]
    fn role_bindings_are_scoped_by_namespace() {
        let store = RbacStore::new();
        let binding = |ns: &str, name: &str| RoleBinding {
            metadata: ObjectMeta::named(name).in_namespace("acme", ns),
            ..Default::default()
        };
        store.put_role_binding(binding("web", "a"));
        store.put_role_binding(binding("web", "b"));
        store.put_role_binding(binding("db", "c"));

        assert_eq!(store.role_bindings("acme", "web").len(), 2);
        assert_eq!(store.role_bindings("acme", "db").len(), 1);
        assert!(store.role_bindings("other", "web").is_empty());
        assert_eq!(
            store.counts(),
            RbacCounts {
                role_bindings: 3,
                ..Default::default()
            }
        );
    }
}
