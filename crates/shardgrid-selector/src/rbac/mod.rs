//! Role-based access control over tenant-scoped roles and bindings.

mod authorizer;
mod resolver;
mod store;
mod types;

pub use authorizer::{Decision, rule_allows};
pub use resolver::{RuleResolver, RuleSource};
pub use store::{RbacCounts, RbacStore};
pub use types::{
    Attributes, CLUSTER_ROLE_KIND, ClusterRole, ClusterRoleBinding, GROUP_KIND, PolicyRule, ROLE_KIND, Role,
    RoleBinding, RoleRef, SERVICE_ACCOUNT_KIND, Subject, USER_KIND, UserInfo, WILDCARD,
};
