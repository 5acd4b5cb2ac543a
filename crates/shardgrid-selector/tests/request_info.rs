//! Request resolution feeding authorization, end to end.

use std::sync::Arc;

use shard_core::ObjectMeta;
use shardgrid_selector::rbac::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use shardgrid_selector::{Attributes, RbacStore, RequestInfoResolver, RuleResolver, UserInfo};

#[test]
fn tenant_scoped_watch() {
    let info = RequestInfoResolver::default()
        .resolve("GET", "/api/v1/tenants/fake_te/namespaces/fake_ns/pods?watch=true")
        .unwrap();

    assert!(info.is_resource_request);
    assert_eq!(info.verb, "watch");
    assert_eq!(info.api_prefix, "api");
    assert_eq!(info.api_group, "");
    assert_eq!(info.api_version, "v1");
    assert_eq!(info.tenant, "fake_te");
    assert_eq!(info.namespace, "fake_ns");
    assert_eq!(info.resource, "pods");
    assert_eq!(info.name, "");
    assert_eq!(info.parts, vec!["pods"]);
}

#[test]
fn legacy_watch_has_no_tenant() {
    let info = RequestInfoResolver::default()
        .resolve("GET", "/api/v1/namespaces/fake_ns/pods?watch=true")
        .unwrap();

    assert_eq!(info.verb, "watch");
    assert_eq!(info.tenant, "");
    assert_eq!(info.namespace, "fake_ns");
    assert_eq!(info.parts, vec!["pods"]);
}

fn resolver_with_legacy_grant(legacy: bool) -> RuleResolver {
    let store = RbacStore::new();
    store.put_cluster_role(ClusterRole {
        metadata: ObjectMeta::named("watcher"),
        rules: vec![PolicyRule::resources(&["list", "watch"], &[""], &["pods"])],
    });
    store.put_cluster_role_binding(ClusterRoleBinding {
        metadata: ObjectMeta::named("watchers"),
        subjects: vec![Subject::user("alice").in_tenant("fake_te")],
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".into(),
            kind: "ClusterRole".into(),
            name: "watcher".into(),
        },
    });
    RuleResolver::new(Arc::new(store)).with_legacy_empty_tenant(legacy)
}

#[test]
fn legacy_tenant_binding_authorizes_tenant_request() {
    let info = RequestInfoResolver::default()
        .resolve("GET", "/api/v1/tenants/fake_te/namespaces/fake_ns/pods?watch=true")
        .unwrap();
    let attrs = Attributes::from_request(UserInfo::new("alice", "fake_te"), &info);

    let decision = resolver_with_legacy_grant(true).authorize(&attrs);
    assert!(decision.is_allowed(), "{decision:?}");

    assert!(!resolver_with_legacy_grant(false).authorize(&attrs).is_allowed());
}

#[test]
fn subject_tenant_must_match_user() {
    let info = RequestInfoResolver::default()
        .resolve("GET", "/api/v1/tenants/fake_te/namespaces/fake_ns/pods")
        .unwrap();
    let attrs = Attributes::from_request(UserInfo::new("alice", "other"), &info);
    assert!(!resolver_with_legacy_grant(true).authorize(&attrs).is_allowed());
}
