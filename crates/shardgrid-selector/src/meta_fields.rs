//! Field sets derived from object metadata.
//!
//! Every kind exposes the same metadata fields to field selectors:
//!
//! | field | value |
//! |---|---|
//! | `metadata.name` | name |
//! | `metadata.tenant` | tenant, `system` when empty |
//! | `metadata.namespace` | namespace (namespaced kinds only) |
//! | `metadata.hashkey` | hash key as a decimal string |
//! | `metadata.ownerReferences.hashkey.<Kind>` | owner's hash key |
//!
//! When several owners share a kind the last one listed wins.

use shard_core::tenant::is_system_tenant;
use shard_core::{ObjectMeta, TENANT_SYSTEM};

use crate::fields::{FieldSet, HASHKEY_FIELD, OWNER_HASHKEY_PREFIX};

pub const NAME_FIELD: &str = "metadata.name";
pub const NAMESPACE_FIELD: &str = "metadata.namespace";
pub const TENANT_FIELD: &str = "metadata.tenant";

pub fn object_meta_field_set(meta: &ObjectMeta, namespaced: bool) -> FieldSet {
    let mut fields = FieldSet::new();
    fields.insert(NAME_FIELD.to_string(), meta.name.clone());
    fields.insert(TENANT_FIELD.to_string(), normalized_tenant(&meta.tenant).to_string());
    if namespaced {
        fields.insert(NAMESPACE_FIELD.to_string(), meta.namespace.clone());
    }
    fields.insert(HASHKEY_FIELD.to_string(), meta.hash_key.to_string());
    for owner in &meta.owner_references {
        fields.insert(
            format!("{OWNER_HASHKEY_PREFIX}{}", owner.kind),
            owner.hash_key.to_string(),
        );
    }
    fields
}

/// Merge kind-specific fields with the metadata fields. Metadata wins on
/// conflict.
pub fn add_object_meta_field_set(mut source: FieldSet, meta: &ObjectMeta, namespaced: bool) -> FieldSet {
    source.extend(object_meta_field_set(meta, namespaced));
    source
}

pub(crate) fn normalized_tenant(tenant: &str) -> &str {
    if is_system_tenant(tenant) { TENANT_SYSTEM } else { tenant }
}
