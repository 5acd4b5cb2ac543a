//! shardgrid-selector — tenant-aware request and object selection.
//!
//! # Components
//!
//! - **`request_info`** — [`RequestInfoResolver`] turns a method and URL into
//!   verb, tenant, namespace and resource, for both tenant and legacy paths
//! - **`fields`** — field [`Selector`]s with hash-key range operators
//! - **`meta_fields`** — the metadata field set every kind exposes
//! - **`index`** — [`Indexer`], an object store with tenant, namespace and
//!   hash-key indexes
//! - **`rbac`** — roles, bindings and [`RuleResolver`], which visits rules
//!   across the request tenant, `system` and the legacy empty tenant

pub mod error;
pub mod fields;
pub mod index;
pub mod meta_fields;
pub mod rbac;
pub mod request_info;

pub use error::{SelectorError, SelectorResult};
pub use fields::{FieldSet, HASHKEY_FIELD, OWNER_HASHKEY_PREFIX, Operator, Requirement, Selector, is_hashkey_field};
pub use index::{HASHKEY_INDEX, IndexFunc, Indexer, NAMESPACE_INDEX, TENANT_INDEX};
pub use meta_fields::{NAME_FIELD, NAMESPACE_FIELD, TENANT_FIELD, add_object_meta_field_set, object_meta_field_set};
pub use rbac::{Attributes, Decision, RbacStore, RuleResolver, UserInfo};
pub use request_info::{RequestInfo, RequestInfoResolver};
