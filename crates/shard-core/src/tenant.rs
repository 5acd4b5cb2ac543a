//! Reserved tenant names.

/// The infrastructure tenant that owns cluster-wide objects.
pub const TENANT_SYSTEM: &str = "system";

/// Wildcard tenant, valid only for list/watch across tenants.
pub const TENANT_ALL: &str = "all";

/// Tenant value of a request that did not name one (legacy paths).
pub const TENANT_NONE: &str = "";

/// Names that never take part in prefix-sharded routing.
pub const RESERVED_TENANTS: [&str; 2] = [TENANT_SYSTEM, TENANT_ALL];

/// Whether `tenant` refers to the system tenant.
///
/// An empty tenant is treated as system for backward compatibility with
/// objects written before tenants existed.
pub fn is_system_tenant(tenant: &str) -> bool {
    tenant.is_empty() || tenant == TENANT_SYSTEM
}

/// Whether `tenant` is one of the reserved names.
pub fn is_reserved_tenant(tenant: &str) -> bool {
    RESERVED_TENANTS.contains(&tenant)
}
