//! `shardd.toml` configuration parser.
//!
//! Every field has a default, so an empty file yields a usable config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShardConfig {
    pub api_server: ApiServerConfig,
    pub partition: PartitionConfig,
    pub client: ClientConfig,
    pub broadcast: BroadcastConfig,
    pub status: StatusConfig,
    pub rbac: RbacConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiServerConfig {
    /// API server used before the endpoint map is known.
    pub bootstrap_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bootstrap_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PartitionConfig {
    /// Service group this process belongs to.
    pub service_group_id: String,
    pub startup_debounce_secs: u64,
    pub sync_retry_interval_secs: u64,
    pub sync_timeout_secs: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            service_group_id: "0".to_string(),
            startup_debounce_secs: 30,
            sync_retry_interval_secs: 10,
            sync_timeout_secs: 300,
        }
    }
}

impl PartitionConfig {
    pub fn startup_debounce(&self) -> Duration {
        Duration::from_secs(self.startup_debounce_secs)
    }

    pub fn sync_retry_interval(&self) -> Duration {
        Duration::from_secs(self.sync_retry_interval_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Swallow sub-watch failures when at least one shard answers.
    pub allow_partial_watch: bool,
    pub scheme: String,
    /// Port used when an endpoint subset declares none.
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            allow_partial_watch: false,
            scheme: "http".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Per-subscriber buffer before the oldest message is dropped.
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatusConfig {
    pub listen: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RbacConfig {
    /// Also consult bindings stored under the empty tenant.
    pub legacy_empty_tenant: bool,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            legacy_empty_tenant: true,
        }
    }
}

impl ShardConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> CoreResult<Self> {
        let config: ShardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let url = &self.api_server.bootstrap_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CoreError::ConfigInvalid(format!(
                "api_server.bootstrap_url must be an http(s) URL, got {url:?}"
            )));
        }
        if self.partition.service_group_id.is_empty() {
            return Err(CoreError::ConfigInvalid(
                "partition.service_group_id must not be empty".to_string(),
            ));
        }
        if self.partition.sync_retry_interval_secs == 0 {
            return Err(CoreError::ConfigInvalid(
                "partition.sync_retry_interval_secs must be positive".to_string(),
            ));
        }
        if self.broadcast.capacity == 0 {
            return Err(CoreError::ConfigInvalid(
                "broadcast.capacity must be positive".to_string(),
            ));
        }
        if !matches!(self.client.scheme.as_str(), "http" | "https") {
            return Err(CoreError::ConfigInvalid(format!(
                "client.scheme must be http or https, got {:?}",
                self.client.scheme
            )));
        }
        Ok(())
    }
}
