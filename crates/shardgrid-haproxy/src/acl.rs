//! ACL patterns shared by the rendered config and the request classifier.

use shard_core::tenant::RESERVED_TENANTS;

/// API version or group segment.
pub const SEGMENT: &str = "[a-z0-9_.-]+";

/// Requests served by the resource partition whatever their origin.
pub const RESOURCE_ACLS: [(&str, &str); 3] = [
    ("rp_nodes_request", "^/api/[a-z0-9_.-]+/(watch/)?nodes(/.*)?$"),
    (
        "rp_leases_request",
        "^/apis/coordination.k8s.io/[a-z0-9_.-]+/(watch/)?leases(/.*)?$",
    ),
    (
        "rp_node_lease_request",
        "^/apis/coordination.k8s.io/[a-z0-9_.-]+/(watch/)?namespaces/kube-node-lease/leases(/.*)?$",
    ),
];

/// `(?!(system$|system/.*$|all$|all/.*$))`
pub fn reserved_lookahead() -> String {
    let alternatives: Vec<String> = RESERVED_TENANTS
        .iter()
        .map(|t| format!("{t}$|{t}/.*$"))
        .collect();
    format!("(?!({}))", alternatives.join("|"))
}

/// Core API paths of tenants whose first letter is in `first..=last`.
pub fn tenant_api_pattern(first: char, last: char) -> String {
    format!("^/api/{SEGMENT}/tenants/{}([{first}-{last}].*)$", reserved_lookahead())
}

/// Grouped API paths of tenants whose first letter is in `first..=last`.
pub fn tenant_apis_pattern(first: char, last: char) -> String {
    format!(
        "^/apis/{SEGMENT}/{SEGMENT}/tenants/{}([{first}-{last}].*)$",
        reserved_lookahead()
    )
}

/// Capture everything after `tenants/` on core API paths.
pub(crate) fn tenant_api_capture() -> String {
    format!("^/api/{SEGMENT}/tenants/(.*)$")
}

pub(crate) fn tenant_apis_capture() -> String {
    format!("^/apis/{SEGMENT}/{SEGMENT}/tenants/(.*)$")
}
