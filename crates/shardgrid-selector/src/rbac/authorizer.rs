use tracing::debug;

use super::resolver::RuleResolver;
use super::types::{Attributes, PolicyRule, WILDCARD};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow { reason: String },
    /// No rule allowed the request. `errors` lists bindings that could not
    /// be resolved along the way.
    NoOpinion { errors: Vec<String> },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

pub fn rule_allows(attrs: &Attributes, rule: &PolicyRule) -> bool {
    if !verb_matches(rule, &attrs.verb) {
        return false;
    }
    if !attrs.is_resource_request {
        return non_resource_url_matches(rule, &attrs.path);
    }
    let combined = if attrs.subresource.is_empty() {
        attrs.resource.clone()
    } else {
        format!("{}/{}", attrs.resource, attrs.subresource)
    };
    api_group_matches(rule, &attrs.api_group)
        && resource_matches(rule, &combined, &attrs.subresource)
        && resource_name_matches(rule, &attrs.name)
}

fn has(items: &[String], value: &str) -> bool {
    items.iter().any(|item| item == WILDCARD || item == value)
}

fn verb_matches(rule: &PolicyRule, verb: &str) -> bool {
    has(&rule.verbs, verb)
}

fn api_group_matches(rule: &PolicyRule, group: &str) -> bool {
    has(&rule.api_groups, group)
}

/// `*/status` grants the status subresource of every resource.
fn resource_matches(rule: &PolicyRule, combined: &str, subresource: &str) -> bool {
    rule.resources.iter().any(|r| {
        r == WILDCARD
            || r == combined
            || (!subresource.is_empty() && r.strip_prefix("*/") == Some(subresource))
    })
}

/// An empty name list grants every name.
fn resource_name_matches(rule: &PolicyRule, name: &str) -> bool {
    rule.resource_names.is_empty() || rule.resource_names.iter().any(|n| n == name)
}

/// Entries ending in `*` grant every path under that prefix.
fn non_resource_url_matches(rule: &PolicyRule, path: &str) -> bool {
    rule.non_resource_urls.iter().any(|url| {
        url == WILDCARD
            || url == path
            || url
                .strip_suffix('*')
                .is_some_and(|prefix| path.starts_with(prefix))
    })
}

impl RuleResolver {
    /// Allow when any rule visible to the caller allows the request.
    pub fn authorize(&self, attrs: &Attributes) -> Decision {
        let mut reason = None;
        let mut errors = Vec::new();
        self.visit_rules_for(&attrs.user, &attrs.tenant, &attrs.namespace, |source, rule| {
            match rule {
                Ok(rule) if rule_allows(attrs, rule) => {
                    reason = Some(format!("allowed by {source}"));
                    return false;
                }
                Ok(_) => {}
                Err(err) => errors.push(err.to_string()),
            }
            true
        });
        match reason {
            Some(reason) => Decision::Allow { reason },
            None => {
                debug!(
                    user = %attrs.user.name,
                    verb = %attrs.verb,
                    tenant = %attrs.tenant,
                    resource = %attrs.resource,
                    "no rbac rule allows request"
                );
                Decision::NoOpinion { errors }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::types::UserInfo;

    fn attrs(verb: &str, resource: &str, subresource: &str, name: &str) -> Attributes {
        Attributes {
            user: UserInfo::new("alice", "acme"),
            verb: verb.to_string(),
            is_resource_request: true,
            resource: resource.to_string(),
            subresource: subresource.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn wildcards() {
        let rule = PolicyRule::resources(&["*"], &["*"], &["*"]);
        assert!(rule_allows(&attrs("delete", "secrets", "", "s"), &rule));
    }

    #[test]
    fn verbs_groups_and_resources_must_all_match() {
        let rule = PolicyRule::resources(&["get", "list"], &[""], &["pods"]);
        assert!(rule_allows(&attrs("list", "pods", "", ""), &rule));
        assert!(!rule_allows(&attrs("create", "pods", "", ""), &rule));
        assert!(!rule_allows(&attrs("get", "services", "", ""), &rule));

        let mut grouped = attrs("get", "pods", "", "");
        grouped.api_group = "apps".into();
        assert!(!rule_allows(&grouped, &rule));
    }

    #[test]
    fn subresources_need_explicit_grant() {
        let plain = PolicyRule::resources(&["update"], &[""], &["pods"]);
        assert!(!rule_allows(&attrs("update", "pods", "status", "p"), &plain));

        let status = PolicyRule::resources(&["update"], &[""], &["pods/status"]);
        assert!(rule_allows(&attrs("update", "pods", "status", "p"), &status));

        let any_status = PolicyRule::resources(&["update"], &[""], &["*/status"]);
        assert!(rule_allows(&attrs("update", "nodes", "status", "n"), &any_status));
        assert!(!rule_allows(&attrs("update", "nodes", "", "n"), &any_status));
    }

    #[test]
    fn resource_names_restrict() {
        let rule = PolicyRule::resources(&["get"], &[""], &["configmaps"]).with_names(&["cfg"]);
        assert!(rule_allows(&attrs("get", "configmaps", "", "cfg"), &rule));
        assert!(!rule_allows(&attrs("get", "configmaps", "", "other"), &rule));
    }

    #[test]
    fn non_resource_urls() {
        let rule = PolicyRule::urls(&["get"], &["/healthz", "/debug/*"]);
        let request = |path: &str| Attributes {
            verb: "get".into(),
            path: path.into(),
            ..Default::default()
        };
        assert!(rule_allows(&request("/healthz"), &rule));
        assert!(rule_allows(&request("/debug/partitions"), &rule));
        assert!(!rule_allows(&request("/metrics"), &rule));
    }
}
