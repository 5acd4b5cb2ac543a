//! Rendering of the partition layout into template sections.
//!
//! | placeholder | content |
//! |---|---|
//! | `tp_request_acl` | two `path_reg` ACLs per tenant partition |
//! | `rp_request_acl` | node and lease ACLs for the resource partition |
//! | `tp_source_acl` | one `src` ACL per tenant partition |
//! | `rp_source_acl` | `src` ACL for the resource partition |
//! | `tp_request_rule` | `use_backend tpN_backend` on the tenant ACLs |
//! | `rp_request_rule` | `use_backend rp_backend` on the resource ACLs |
//! | `partition_source_rule` | route partition-originated traffic back to its own backend |
//! | `backends` | one backend per partition |
//! | `connection_timeout` | e.g. `10s` |
//! | `proxy_port` | frontend bind port |

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use regex::Regex;

use crate::acl::{RESOURCE_ACLS, tenant_api_pattern, tenant_apis_pattern};
use crate::error::{HaproxyError, HaproxyResult};
use crate::partition::PartitionLayout;

pub const DEFAULT_PROXY_PORT: u16 = 6443;
pub const DEFAULT_CONNECTION_TIMEOUT: &str = "10s";
pub const DEFAULT_CA_FILE: &str = "/etc/haproxy/certs/ca.crt";

const RP_BACKEND: &str = "rp_backend";

/// How TLS reaches the partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Re-encrypt to the partition on 443, verifying it with a CA file.
    Bridging,
    /// Plain HTTP to the partition on 8080.
    Offloading,
}

impl TlsMode {
    pub fn backend_port(self) -> u16 {
        match self {
            TlsMode::Bridging => 443,
            TlsMode::Offloading => 8080,
        }
    }
}

impl FromStr for TlsMode {
    type Err = HaproxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bridging" => Ok(TlsMode::Bridging),
            "offloading" => Ok(TlsMode::Offloading),
            _ => Err(HaproxyError::UnknownTlsMode(s.to_string())),
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsMode::Bridging => f.write_str("bridging"),
            TlsMode::Offloading => f.write_str("offloading"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub tls_mode: TlsMode,
    /// HAProxy time value: digits with an optional `us|ms|s|m|h|d` unit.
    pub connection_timeout: String,
    pub proxy_port: u16,
    /// Used in bridging mode only.
    pub ca_file: String,
}

impl RenderOptions {
    pub fn new(tls_mode: TlsMode) -> Self {
        Self {
            tls_mode,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT.to_string(),
            proxy_port: DEFAULT_PROXY_PORT,
            ca_file: DEFAULT_CA_FILE.to_string(),
        }
    }

    pub fn with_connection_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.connection_timeout = timeout.into();
        self
    }

    pub fn with_proxy_port(mut self, port: u16) -> Self {
        self.proxy_port = port;
        self
    }

    pub fn with_ca_file(mut self, path: impl Into<String>) -> Self {
        self.ca_file = path.into();
        self
    }

    pub fn validate(&self) -> HaproxyResult<()> {
        let time = Regex::new(r"^[0-9]+(us|ms|s|m|h|d)?$")?;
        if !time.is_match(&self.connection_timeout) {
            return Err(HaproxyError::InvalidTimeout(self.connection_timeout.clone()));
        }
        Ok(())
    }
}

/// Every placeholder value for `layout` under `options`.
pub fn sections(layout: &PartitionLayout, options: &RenderOptions) -> BTreeMap<&'static str, String> {
    let tps = &layout.tenant_partitions;
    let rp = layout.resource_partition;

    let tp_request_acl = tps
        .iter()
        .flat_map(|tp| {
            [
                format!(
                    "acl tp{}_api_request path_reg {}",
                    tp.index,
                    tenant_api_pattern(tp.first, tp.last)
                ),
                format!(
                    "acl tp{}_apis_request path_reg {}",
                    tp.index,
                    tenant_apis_pattern(tp.first, tp.last)
                ),
            ]
        })
        .collect::<Vec<_>>();

    let rp_request_acl = RESOURCE_ACLS
        .iter()
        .map(|(name, pattern)| format!("acl {name} path_reg {pattern}"))
        .collect::<Vec<_>>();

    let tp_source_acl = tps
        .iter()
        .map(|tp| format!("acl from_tp{} src {}", tp.index, tp.ip))
        .collect::<Vec<_>>();

    let tp_request_rule = tps
        .iter()
        .map(|tp| {
            format!(
                "use_backend tp{i}_backend if tp{i}_api_request || tp{i}_apis_request",
                i = tp.index
            )
        })
        .collect::<Vec<_>>();

    let rp_acl_names: Vec<&str> = RESOURCE_ACLS.iter().map(|(name, _)| *name).collect();

    let mut partition_source_rule = tps
        .iter()
        .map(|tp| format!("use_backend tp{i}_backend if from_tp{i}", i = tp.index))
        .collect::<Vec<_>>();
    partition_source_rule.push(format!("use_backend {RP_BACKEND} if from_rp"));

    let mut backends = tps
        .iter()
        .map(|tp| backend(&format!("tp{}", tp.index), tp.ip, options))
        .collect::<Vec<_>>();
    backends.push(backend("rp", rp, options));

    BTreeMap::from([
        ("tp_request_acl", tp_request_acl.join("\n")),
        ("rp_request_acl", rp_request_acl.join("\n")),
        ("tp_source_acl", tp_source_acl.join("\n")),
        ("rp_source_acl", format!("acl from_rp src {rp}")),
        ("tp_request_rule", tp_request_rule.join("\n")),
        (
            "rp_request_rule",
            format!("use_backend {RP_BACKEND} if {}", rp_acl_names.join(" || ")),
        ),
        ("partition_source_rule", partition_source_rule.join("\n")),
        ("backends", backends.join("\n\n")),
        ("connection_timeout", options.connection_timeout.clone()),
        ("proxy_port", options.proxy_port.to_string()),
    ])
}

fn backend(name: &str, ip: IpAddr, options: &RenderOptions) -> String {
    let addr = SocketAddr::new(ip, options.tls_mode.backend_port());
    match options.tls_mode {
        TlsMode::Bridging => format!(
            "backend {name}_backend\n    mode http\n    option tcp-check\n    tcp-check connect\n    server {name} {addr} check ssl verify required ca-file {}",
            options.ca_file
        ),
        TlsMode::Offloading => format!("backend {name}_backend\n    mode http\n    server {name} {addr} check"),
    }
}
