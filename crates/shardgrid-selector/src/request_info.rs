//! Request info: what a URL is asking for.
//!
//! Both URL families are accepted:
//!
//! ```text
//! /api/{v}/[namespaces/{ns}/]{resource}[/{name}[/{sub}]]                 legacy, tenant ""
//! /api/{v}/tenants/{te}/[namespaces/{ns}/]{resource}[/{name}[/{sub}]]
//! /apis/{g}/{v}/[tenants/{te}/][namespaces/{ns}/]{resource}[/{name}[/{sub}]]
//! ```
//!
//! Verbs come from the HTTP method and the URL shape:
//!
//! | method | item | collection |
//! |---|---|---|
//! | GET, HEAD | get | list (watch with `?watch=true`) |
//! | POST | create | create |
//! | PUT | update | update |
//! | PATCH | patch | patch |
//! | DELETE | delete | deletecollection |
//!
//! `/{prefix}/.../watch/...` and `/{prefix}/.../proxy/...` set the verb
//! from the path instead.

use std::collections::BTreeSet;

use shard_core::TENANT_NONE;

use crate::error::{SelectorError, SelectorResult};
use crate::fields::Selector;

/// Path segments that name the verb when they follow the version.
const SPECIAL_VERBS: [&str; 2] = ["proxy", "watch"];

/// Subresources of a tenant or namespace object itself, as opposed to
/// objects inside it.
const SCOPE_SUBRESOURCES: [&str; 2] = ["status", "finalize"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub is_resource_request: bool,
    pub path: String,
    pub verb: String,
    pub api_prefix: String,
    pub api_group: String,
    pub api_version: String,
    /// Empty on legacy paths.
    pub tenant: String,
    pub namespace: String,
    pub resource: String,
    pub subresource: String,
    pub name: String,
    /// Path segments from the resource onward.
    pub parts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RequestInfoResolver {
    api_prefixes: BTreeSet<String>,
    grouped_api_prefixes: BTreeSet<String>,
}

impl Default for RequestInfoResolver {
    fn default() -> Self {
        Self::new(&["api", "apis"], &["apis"])
    }
}

impl RequestInfoResolver {
    pub fn new(api_prefixes: &[&str], grouped_api_prefixes: &[&str]) -> Self {
        Self {
            api_prefixes: api_prefixes.iter().map(|p| p.to_string()).collect(),
            grouped_api_prefixes: grouped_api_prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Resolve `method` and a request target (`path[?query]`).
    ///
    /// Paths outside the API prefixes are non-resource requests whose verb
    /// is the lowercased method.
    pub fn resolve(&self, method: &str, target: &str) -> SelectorResult<RequestInfo> {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        if !path.starts_with('/') {
            return Err(SelectorError::InvalidPath(target.to_string()));
        }

        let mut info = RequestInfo {
            path: path.to_string(),
            verb: method.to_ascii_lowercase(),
            tenant: TENANT_NONE.to_string(),
            ..Default::default()
        };

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let mut parts: &[&str] = &segments;
        if parts.len() < 3 || !self.api_prefixes.contains(parts[0]) {
            return Ok(info);
        }
        info.api_prefix = parts[0].to_string();
        parts = &parts[1..];

        if self.grouped_api_prefixes.contains(&info.api_prefix) {
            info.api_group = parts[0].to_string();
            parts = &parts[1..];
        }
        let Some((version, rest)) = parts.split_first() else {
            return Ok(info);
        };
        info.api_version = version.to_string();
        parts = rest;
        if parts.is_empty() || parts[0].is_empty() {
            return Ok(info);
        }
        info.is_resource_request = true;

        if SPECIAL_VERBS.contains(&parts[0]) {
            if parts.len() < 2 {
                return Err(SelectorError::InvalidPath(target.to_string()));
            }
            info.verb = parts[0].to_string();
            parts = &parts[1..];
        } else {
            info.verb = match method {
                "POST" => "create",
                "GET" | "HEAD" => "get",
                "PUT" => "update",
                "PATCH" => "patch",
                "DELETE" => "delete",
                _ => "",
            }
            .to_string();
        }

        parts = take_scope(parts, "tenants", &mut info.tenant);
        parts = take_scope(parts, "namespaces", &mut info.namespace);

        info.parts = parts.iter().map(|p| p.to_string()).collect();
        if let Some(resource) = parts.first() {
            info.resource = resource.to_string();
        }
        if let Some(name) = parts.get(1) {
            info.name = name.to_string();
        }
        if let Some(sub) = parts.get(2) {
            info.subresource = sub.to_string();
        }

        if info.name.is_empty() && info.verb == "get" {
            info.verb = "list".to_string();
            if is_true(query_param(query, "watch").as_deref()) {
                info.verb = "watch".to_string();
            }
        }
        if matches!(info.verb.as_str(), "list" | "watch") {
            // A collection call pinned to one object by name.
            let pinned = query_param(query, "fieldSelector")
                .and_then(|raw| Selector::parse(&raw).ok())
                .and_then(|selector| selector.requires_exact_match("metadata.name"));
            if let Some(name) = pinned {
                info.name = name;
            }
        }
        if info.name.is_empty() && info.verb == "delete" {
            info.verb = "deletecollection".to_string();
        }
        Ok(info)
    }
}

/// Consume a leading `{kind}/{value}` scope prefix.
///
/// `tenants/t1` and `namespaces/ns` on their own address the scope object
/// itself and are left in place; so is a trailing scope subresource.
fn take_scope<'a>(parts: &'a [&'a str], kind: &str, value: &mut String) -> &'a [&'a str] {
    if parts.len() < 2 || parts[0] != kind {
        return parts;
    }
    *value = parts[1].to_string();
    if parts.len() > 2 && !SCOPE_SUBRESOURCES.contains(&parts[2]) {
        &parts[2..]
    } else {
        parts
    }
}

fn is_true(value: Option<&str>) -> bool {
    matches!(value, Some("true") | Some("1"))
}

/// First value of `key` in a query string, percent-decoded.
fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        (k == key).then(|| percent_decode(v))
    })
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
