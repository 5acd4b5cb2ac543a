use serde::{Deserialize, Serialize};
use shard_core::{ObjectMeta, Resource};

use crate::request_info::RequestInfo;

pub const USER_KIND: &str = "User";
pub const GROUP_KIND: &str = "Group";
pub const SERVICE_ACCOUNT_KIND: &str = "ServiceAccount";
pub const ROLE_KIND: &str = "Role";
pub const CLUSTER_ROLE_KIND: &str = "ClusterRole";

/// `*` in any rule list matches everything.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyRule {
    pub verbs: Vec<String>,
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub resource_names: Vec<String>,
    #[serde(rename = "nonResourceURLs")]
    pub non_resource_urls: Vec<String>,
}

impl PolicyRule {
    pub fn resources(verbs: &[&str], api_groups: &[&str], resources: &[&str]) -> Self {
        Self {
            verbs: strings(verbs),
            api_groups: strings(api_groups),
            resources: strings(resources),
            ..Default::default()
        }
    }

    pub fn urls(verbs: &[&str], urls: &[&str]) -> Self {
        Self {
            verbs: strings(verbs),
            non_resource_urls: strings(urls),
            ..Default::default()
        }
    }

    pub fn with_names(mut self, names: &[&str]) -> Self {
        self.resource_names = strings(names);
        self
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct RoleRef {
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Subject {
    pub kind: String,
    pub api_group: String,
    pub name: String,
    /// Service-account namespace.
    pub namespace: String,
    /// Tenant the subject belongs to. Empty matches a user of any tenant.
    pub tenant: String,
}

impl Subject {
    pub fn user(name: &str) -> Self {
        Self {
            kind: USER_KIND.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn group(name: &str) -> Self {
        Self {
            kind: GROUP_KIND.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn service_account(namespace: &str, name: &str) -> Self {
        Self {
            kind: SERVICE_ACCOUNT_KIND.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    pub fn in_tenant(mut self, tenant: &str) -> Self {
        self.tenant = tenant.to_string();
        self
    }

    pub fn applies_to(&self, user: &UserInfo) -> bool {
        if !self.tenant.is_empty() && self.tenant != user.tenant {
            return false;
        }
        match self.kind.as_str() {
            USER_KIND => self.name == user.name,
            GROUP_KIND => user.groups.iter().any(|g| *g == self.name),
            SERVICE_ACCOUNT_KIND => {
                !self.namespace.is_empty()
                    && user.name == format!("system:serviceaccount:{}:{}", self.namespace, self.name)
            }
            _ => false,
        }
    }
}

macro_rules! rbac_resource {
    ($ty:ident, $kind:literal, { $($field:ident : $fty:ty),* $(,)? }) => {
        #[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
        #[serde(default, rename_all = "camelCase")]
        pub struct $ty {
            pub metadata: ObjectMeta,
            $(pub $field: $fty,)*
        }

        impl Resource for $ty {
            const KIND: &'static str = $kind;

            fn meta(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

rbac_resource!(Role, "Role", { rules: Vec<PolicyRule> });
rbac_resource!(ClusterRole, "ClusterRole", { rules: Vec<PolicyRule> });
rbac_resource!(RoleBinding, "RoleBinding", { subjects: Vec<Subject>, role_ref: RoleRef });
rbac_resource!(ClusterRoleBinding, "ClusterRoleBinding", { subjects: Vec<Subject>, role_ref: RoleRef });

/// The authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
    pub groups: Vec<String>,
    pub tenant: String,
}

impl UserInfo {
    pub fn new(name: &str, tenant: &str) -> Self {
        Self {
            name: name.to_string(),
            tenant: tenant.to_string(),
            groups: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = strings(groups);
        self
    }
}

/// Everything an authorization decision looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pub user: UserInfo,
    pub verb: String,
    pub is_resource_request: bool,
    pub path: String,
    pub tenant: String,
    pub namespace: String,
    pub api_group: String,
    pub resource: String,
    pub subresource: String,
    pub name: String,
}

impl Attributes {
    pub fn from_request(user: UserInfo, info: &RequestInfo) -> Self {
        Self {
            user,
            verb: info.verb.clone(),
            is_resource_request: info.is_resource_request,
            path: info.path.clone(),
            tenant: info.tenant.clone(),
            namespace: info.namespace.clone(),
            api_group: info.api_group.clone(),
            resource: info.resource.clone(),
            subresource: info.subresource.clone(),
            name: info.name.clone(),
        }
    }
}
