//! Process-wide API-server endpoint map.
//!
//! The API-server config manager hands every accepted map to a
//! [`ConfigHook`]. The store is the default hook: it keeps the latest map
//! and reports whether anything changed, and client pools read their
//! target URLs from it.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use shard_core::EndpointSubset;
use tracing::debug;

/// `serviceGroupId → EndpointSubset`.
pub type EndpointMap = BTreeMap<String, EndpointSubset>;

/// Applies a new endpoint map; returns whether something changed.
pub type ConfigHook = Arc<dyn Fn(&EndpointMap) -> bool + Send + Sync>;

#[derive(Default)]
pub struct ApiServerConfigStore {
    current: RwLock<EndpointMap>,
    generation: AtomicU64,
}

impl ApiServerConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored map. Returns false if it was already equal.
    pub fn set(&self, map: &EndpointMap) -> bool {
        let mut current = self.current.write().expect("config store lock");
        if *current == *map {
            return false;
        }
        *current = map.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(groups = map.len(), generation, "api server config stored");
        true
    }

    pub fn get(&self) -> EndpointMap {
        self.current.read().expect("config store lock").clone()
    }

    /// Number of accepted changes so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Base URL of every service group's load balancer.
    ///
    /// Subsets without an address are skipped; subsets without a port use
    /// `default_port`.
    pub fn urls(&self, scheme: &str, default_port: u16) -> BTreeMap<String, String> {
        endpoint_urls(&self.current.read().expect("config store lock"), scheme, default_port)
    }

    /// This store as the config manager's hook.
    pub fn hook(self: &Arc<Self>) -> ConfigHook {
        let store = Arc::clone(self);
        Arc::new(move |map: &EndpointMap| store.set(map))
    }
}

/// Load-balancer base URL per service group, e.g. `http://10.0.0.1:8080`
/// or `http://[fd00::1]:8080`.
pub fn endpoint_urls(map: &EndpointMap, scheme: &str, default_port: u16) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(group, subset)| {
            let lb = subset.load_balancer()?;
            let port = subset.ports.first().map(|p| p.port).unwrap_or(default_port);
            let authority = match lb.ip.parse::<IpAddr>() {
                Ok(ip) => SocketAddr::new(ip, port).to_string(),
                Err(_) => format!("{}:{port}", lb.ip),
            };
            Some((group.clone(), format!("{scheme}://{authority}")))
        })
        .collect()
}
