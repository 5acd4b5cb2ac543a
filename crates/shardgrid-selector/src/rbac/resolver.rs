//! Rule visitation across tenants.
//!
//! ```text
//!   request tenant ──► cluster role bindings ─┐
//!   system         ──► cluster role bindings ─┼─► visitor(source, rule)
//!   "" (legacy)    ──► cluster role bindings ─┤
//!   (tenant, ns)   ──► role bindings ─────────┘
//! ```
//!
//! A binding resolves its role in the tenant the binding was written in.

use std::fmt;
use std::sync::Arc;

use shard_core::{TENANT_NONE, TENANT_SYSTEM};
use tracing::debug;

use super::store::RbacStore;
use super::types::{CLUSTER_ROLE_KIND, PolicyRule, ROLE_KIND, RoleRef, Subject, UserInfo};
use crate::error::SelectorError;

/// Where a visited rule came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSource {
    pub binding_kind: &'static str,
    pub binding_tenant: String,
    pub binding_namespace: String,
    pub binding_name: String,
    pub role_kind: String,
    pub role_name: String,
    /// Index of the subject that matched the user.
    pub subject: usize,
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.binding_kind, self.binding_name)?;
        if !self.binding_namespace.is_empty() {
            write!(f, " in namespace {:?}", self.binding_namespace)?;
        }
        write!(
            f,
            " of tenant {:?} binds {} {:?}",
            self.binding_tenant, self.role_kind, self.role_name
        )
    }
}

pub struct RuleResolver {
    store: Arc<RbacStore>,
    legacy_empty_tenant: bool,
}

impl RuleResolver {
    pub fn new(store: Arc<RbacStore>) -> Self {
        Self {
            store,
            legacy_empty_tenant: true,
        }
    }

    /// Whether bindings stored under the empty tenant are consulted.
    pub fn with_legacy_empty_tenant(mut self, enabled: bool) -> Self {
        self.legacy_empty_tenant = enabled;
        self
    }

    pub fn legacy_empty_tenant(&self) -> bool {
        self.legacy_empty_tenant
    }

    pub fn store(&self) -> &Arc<RbacStore> {
        &self.store
    }

    /// Tenants whose cluster role bindings apply to a request in `tenant`,
    /// in visiting order.
    pub fn candidate_tenants(&self, tenant: &str) -> Vec<String> {
        let mut tenants = vec![tenant.to_string()];
        for candidate in [TENANT_SYSTEM, TENANT_NONE] {
            if candidate == TENANT_NONE && !self.legacy_empty_tenant {
                continue;
            }
            if !tenants.iter().any(|t| t == candidate) {
                tenants.push(candidate.to_string());
            }
        }
        tenants
    }

    /// Feed every rule that applies to `user` in (`tenant`, `namespace`) to
    /// `visitor`, stopping early when it returns `false`.
    ///
    /// Bindings that reference a missing role are reported to the visitor as
    /// errors and visitation continues.
    pub fn visit_rules_for<F>(&self, user: &UserInfo, tenant: &str, namespace: &str, mut visitor: F)
    where
        F: FnMut(&RuleSource, Result<&PolicyRule, &SelectorError>) -> bool,
    {
        for binding_tenant in self.candidate_tenants(tenant) {
            for binding in self.store.cluster_role_bindings(&binding_tenant) {
                let Some(subject) = applies_to(&binding.subjects, user) else {
                    continue;
                };
                let source = RuleSource {
                    binding_kind: "ClusterRoleBinding",
                    binding_tenant: binding_tenant.clone(),
                    binding_namespace: String::new(),
                    binding_name: binding.metadata.name.clone(),
                    role_kind: binding.role_ref.kind.clone(),
                    role_name: binding.role_ref.name.clone(),
                    subject,
                };
                if !self.visit_role(&binding.role_ref, &binding_tenant, "", &source, &mut visitor) {
                    return;
                }
            }
        }

        if namespace.is_empty() {
            return;
        }
        for binding in self.store.role_bindings(tenant, namespace) {
            let Some(subject) = applies_to(&binding.subjects, user) else {
                continue;
            };
            let source = RuleSource {
                binding_kind: "RoleBinding",
                binding_tenant: tenant.to_string(),
                binding_namespace: namespace.to_string(),
                binding_name: binding.metadata.name.clone(),
                role_kind: binding.role_ref.kind.clone(),
                role_name: binding.role_ref.name.clone(),
                subject,
            };
            if !self.visit_role(&binding.role_ref, tenant, namespace, &source, &mut visitor) {
                return;
            }
        }
    }

    /// Every applicable rule plus the errors met on the way.
    pub fn rules_for(&self, user: &UserInfo, tenant: &str, namespace: &str) -> (Vec<PolicyRule>, Vec<SelectorError>) {
        let mut rules = Vec::new();
        let mut errors = Vec::new();
        self.visit_rules_for(user, tenant, namespace, |_, rule| {
            match rule {
                Ok(rule) => rules.push(rule.clone()),
                Err(err) => errors.push(err.clone()),
            }
            true
        });
        (rules, errors)
    }

    fn visit_role<F>(&self, role_ref: &RoleRef, tenant: &str, namespace: &str, source: &RuleSource, visitor: &mut F) -> bool
    where
        F: FnMut(&RuleSource, Result<&PolicyRule, &SelectorError>) -> bool,
    {
        let rules = match role_ref.kind.as_str() {
            ROLE_KIND if !namespace.is_empty() => self
                .store
                .role(tenant, namespace, &role_ref.name)
                .map(|role| role.rules),
            CLUSTER_ROLE_KIND => self.store.cluster_role(tenant, &role_ref.name).map(|role| role.rules),
            _ => None,
        };
        let Some(rules) = rules else {
            debug!(%source, "role reference does not resolve");
            let err = SelectorError::RoleNotFound {
                kind: role_ref.kind.clone(),
                tenant: tenant.to_string(),
                name: role_ref.name.clone(),
            };
            return visitor(source, Err(&err));
        };
        rules.iter().all(|rule| visitor(source, Ok(rule)))
    }
}

fn applies_to(subjects: &[Subject], user: &UserInfo) -> Option<usize> {
    subjects.iter().position(|s| s.applies_to(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::types::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
    use shard_core::ObjectMeta;

    fn meta(tenant: &str, ns: &str, name: &str) -> ObjectMeta {
        ObjectMeta::named(name).in_namespace(tenant, ns)
    }

    fn role_ref(kind: &str, name: &str) -> RoleRef {
        RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    fn store() -> Arc<RbacStore> {
        let store = RbacStore::new();
        for (tenant, verb) in [("acme", "create"), ("system", "get"), ("", "delete")] {
            store.put_cluster_role(ClusterRole {
                metadata: meta(tenant, "", "r"),
                rules: vec![PolicyRule::resources(&[verb], &[""], &["pods"])],
            });
            store.put_cluster_role_binding(ClusterRoleBinding {
                metadata: meta(tenant, "", "b"),
                subjects: vec![Subject::user("alice")],
                role_ref: role_ref(CLUSTER_ROLE_KIND, "r"),
            });
        }
        store.put_role(Role {
            metadata: meta("acme", "web", "editor"),
            rules: vec![PolicyRule::resources(&["update"], &[""], &["pods"])],
        });
        store.put_role_binding(RoleBinding {
            metadata: meta("acme", "web", "edit"),
            subjects: vec![Subject::group("devs")],
            role_ref: role_ref(ROLE_KIND, "editor"),
        });
        Arc::new(store)
    }

    fn visited_verbs(resolver: &RuleResolver, user: &UserInfo, ns: &str) -> Vec<String> {
        let (rules, errors) = resolver.rules_for(user, "acme", ns);
        assert!(errors.is_empty());
        rules.into_iter().flat_map(|r| r.verbs).collect()
    }

    #[test]
    fn tenants_visited_own_then_system_then_legacy() {
        let resolver = RuleResolver::new(store());
        let alice = UserInfo::new("alice", "acme");
        assert_eq!(visited_verbs(&resolver, &alice, ""), vec!["create", "get", "delete"]);
    }

    #[test]
    fn candidates_are_deduplicated() {
        let resolver = RuleResolver::new(store());
        assert_eq!(resolver.candidate_tenants("acme"), vec!["acme", "system", ""]);
        assert_eq!(resolver.candidate_tenants("system"), vec!["system", ""]);
        assert_eq!(resolver.candidate_tenants(""), vec!["", "system"]);
        let strict = RuleResolver::new(store()).with_legacy_empty_tenant(false);
        assert_eq!(strict.candidate_tenants("acme"), vec!["acme", "system"]);
    }

    #[test]
    fn legacy_tenant_can_be_disabled() {
        let resolver = RuleResolver::new(store()).with_legacy_empty_tenant(false);
        let alice = UserInfo::new("alice", "acme");
        assert_eq!(visited_verbs(&resolver, &alice, ""), vec!["create", "get"]);
    }

    #[test]
    fn role_bindings_follow_cluster_bindings() {
        let resolver = RuleResolver::new(store());
        let alice = UserInfo::new("alice", "acme").with_groups(&["devs"]);
        assert_eq!(
            visited_verbs(&resolver, &alice, "web"),
            vec!["create", "get", "delete", "update"]
        );
    }

    #[test]
    fn visitor_can_stop_early() {
        let resolver = RuleResolver::new(store());
        let alice = UserInfo::new("alice", "acme");
        let mut seen = Vec::new();
        resolver.visit_rules_for(&alice, "acme", "", |source, _| {
            seen.push(source.binding_tenant.clone());
            false
        });
        assert_eq!(seen, vec!["acme"]);
    }

    #[test]
    fn dangling_role_ref_is_reported() {
        let store = RbacStore::new();
        store.put_cluster_role_binding(ClusterRoleBinding {
            metadata: meta("acme", "", "b"),
            subjects: vec![Subject::user("bob")],
            role_ref: role_ref(CLUSTER_ROLE_KIND, "missing"),
        });
        let resolver = RuleResolver::new(Arc::new(store));
        let (rules, errors) = resolver.rules_for(&UserInfo::new("bob", "acme"), "acme", "");
        assert!(rules.is_empty());
        assert_eq!(
            errors,
            vec![SelectorError::RoleNotFound {
                kind: "ClusterRole".into(),
                tenant: "acme".into(),
                name: "missing".into(),
            }]
        );
    }

    #[test]
    fn source_display_names_binding_and_role() {
        let source = RuleSource {
            binding_kind: "RoleBinding",
            binding_tenant: "acme".into(),
            binding_namespace: "web".into(),
            binding_name: "edit".into(),
            role_kind: "Role".into(),
            role_name: "editor".into(),
            subject: 0,
        };
        assert_eq!(
            source.to_string(),
            r#"RoleBinding "edit" in namespace "web" of tenant "acme" binds Role "editor""#
        );
    }
}
