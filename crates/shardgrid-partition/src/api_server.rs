//! API-server config manager — which API-server group serves what.
//!
//! The manager watches the `kubernetes` endpoints object in the system
//! tenant's `default` namespace. Each subset names a service group; the
//! first address of a subset is that group's load balancer.
//!
//! # Propagation
//!
//! ```text
//! endpoints event ──► diff ──► signal ──► debouncer ──► hook ──► latch ──► broadcast
//!                                          (sleeps until first sight + window)
//! ```
//!
//! The debouncer is a single task. Signals that arrive while it waits for
//! the startup window are coalesced, so a burst of changes during startup
//! produces one propagation carrying the final map.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use shard_core::config::PartitionConfig;
use shard_core::tenant::is_system_tenant;
use shard_core::{DEFAULT_NAMESPACE, EndpointSubset, Endpoints, KUBERNETES_SERVICE_NAME, Resource};
use shardgrid_bcast::{BroadcastGroup, DrainLatch, Subscription};
use shardgrid_watch::{DeletedObject, ResourceEventHandler};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config_store::{ConfigHook, EndpointMap};
use crate::error::{PartitionError, PartitionResult};
use crate::fatal::{FatalHook, exit_process, report};

/// Name of the broadcast group carrying API-server config updates.
pub const API_SERVER_CONFIG_GROUP: &str = "api-server-config-updates";

/// Name of the latch client pools release after rebuilding.
pub const CLIENT_DRAIN_LATCH: &str = "clients-must-drain";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerConfigUpdate {
    pub endpoints: EndpointMap,
}

#[derive(Debug, Clone, Copy)]
pub struct ApiServerManagerSettings {
    /// Quiet period after the first observation before clients are reset.
    pub startup_debounce: Duration,
    pub sync_retry_interval: Duration,
    pub sync_timeout: Duration,
}

impl Default for ApiServerManagerSettings {
    fn default() -> Self {
        Self::from(&PartitionConfig::default())
    }
}

impl From<&PartitionConfig> for ApiServerManagerSettings {
    fn from(config: &PartitionConfig) -> Self {
        Self {
            startup_debounce: config.startup_debounce(),
            sync_retry_interval: config.sync_retry_interval(),
            sync_timeout: config.sync_timeout(),
        }
    }
}

type SyncFn = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Default)]
struct State {
    endpoints: EndpointMap,
    observed: bool,
    rev: u64,
    /// End of the startup window, fixed at the first observation.
    first_update: Option<Instant>,
    initialized: bool,
    /// Map last handed to the hook (or adopted at startup).
    propagated: Option<EndpointMap>,
}

pub struct ApiServerConfigManager {
    settings: ApiServerManagerSettings,
    state: Mutex<State>,
    group: Arc<BroadcastGroup<ApiServerConfigUpdate>>,
    latch: Arc<DrainLatch>,
    hook: ConfigHook,
    fatal: FatalHook,
    sync_fn: Option<SyncFn>,
    signal_tx: mpsc::UnboundedSender<()>,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

impl ApiServerConfigManager {
    pub fn new(
        settings: ApiServerManagerSettings,
        group: Arc<BroadcastGroup<ApiServerConfigUpdate>>,
        latch: Arc<DrainLatch>,
        hook: ConfigHook,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            settings,
            state: Mutex::new(State::default()),
            group,
            latch,
            hook,
            fatal: exit_process(),
            sync_fn: None,
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
        }
    }

    pub fn with_fatal_hook(mut self, hook: FatalHook) -> Self {
        self.fatal = hook;
        self
    }

    /// Replace the readiness check used by [`wait_for_sync`](Self::wait_for_sync).
    /// By default the manager is synced once it has seen the endpoints object.
    pub fn with_sync_fn(mut self, f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.sync_fn = Some(Arc::new(f));
        self
    }

    pub fn subscribe(&self) -> Subscription<ApiServerConfigUpdate> {
        self.group.join()
    }

    pub fn latch(&self) -> &Arc<DrainLatch> {
        &self.latch
    }

    /// Current endpoint map as last observed.
    pub fn endpoints(&self) -> EndpointMap {
        self.state.lock().expect("api server config lock").endpoints.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().expect("api server config lock").initialized
    }

    fn is_synced(&self) -> bool {
        match &self.sync_fn {
            Some(f) => f(),
            None => self.state.lock().expect("api server config lock").observed,
        }
    }

    // ── Observation ────────────────────────────────────────────────

    /// Apply an add/update of the endpoints object. Returns whether the
    /// map changed.
    pub fn observe(&self, endpoints: &Endpoints) -> PartitionResult<bool> {
        if !is_api_server_endpoints(endpoints) {
            return Ok(false);
        }
        let rv = endpoints.revision()?;

        let mut state = self.state.lock().expect("api server config lock");
        if state.observed && rv <= state.rev {
            debug!(rev = rv, stored = state.rev, "stale api server endpoints ignored");
            return Ok(false);
        }
        state.rev = rv;
        if !state.observed {
            state.observed = true;
            state.first_update = Some(Instant::now() + self.settings.startup_debounce);
            info!(
                window_secs = self.settings.startup_debounce.as_secs(),
                "api server endpoints observed, startup window open"
            );
        }

        let map = endpoint_map(&endpoints.subsets);
        if map == state.endpoints {
            debug!(rev = rv, "api server endpoints unchanged");
            return Ok(false);
        }
        info!(groups = ?map.keys().collect::<Vec<_>>(), rev = rv, "api server endpoints changed");
        state.endpoints = map;
        drop(state);

        // The receiver lives until the manager is dropped.
        let _ = self.signal_tx.send(());
        Ok(true)
    }

    fn observe_delete(&self, obj: &DeletedObject<Endpoints>) {
        if is_api_server_endpoints(obj.object()) {
            warn!("api server endpoints deleted, keeping last known map");
        }
    }

    // ── Debouncer ──────────────────────────────────────────────────

    /// Spawn the debouncer. Call once; later calls return a finished task.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let rx = self.signal_rx.lock().expect("api server signal lock").take();
        let Some(mut rx) = rx else {
            warn!("api server config debouncer already started");
            return tokio::spawn(async {});
        };

        tokio::spawn(async move {
            info!("api server config debouncer started");
            loop {
                tokio::select! {
                    _ = shutdown.wait_for(|s| *s) => break,
                    signal = rx.recv() => if signal.is_none() { break },
                }

                let deadline = self.state.lock().expect("api server config lock").first_update;
                if let Some(deadline) = deadline {
                    tokio::select! {
                        _ = shutdown.wait_for(|s| *s) => break,
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                while rx.try_recv().is_ok() {}

                self.propagate();
            }
            info!("api server config debouncer stopped");
        })
    }

    /// Hand the current map to the hook and, if it changed something,
    /// arm the drain latch and broadcast. Runs under the manager lock.
    fn propagate(&self) {
        let mut state = self.state.lock().expect("api server config lock");

        if !state.initialized {
            state.initialized = true;
            if state.endpoints.len() == 1 {
                info!("single api server group at startup, clients already configured");
                state.propagated = Some(state.endpoints.clone());
                return;
            }
        }
        if state.propagated.as_ref() == Some(&state.endpoints) {
            debug!("api server endpoints unchanged since last propagation");
            return;
        }

        let changed = (self.hook)(&state.endpoints);
        state.propagated = Some(state.endpoints.clone());
        if !changed {
            debug!("api server config hook reported no change");
            return;
        }

        let readers = self.group.reader_count();
        self.latch.add(readers);
        let update = ApiServerConfigUpdate {
            endpoints: state.endpoints.clone(),
        };
        match self.group.send(update) {
            Ok(generation) => info!(
                groups = state.endpoints.len(),
                readers,
                generation,
                "api server config update broadcast"
            ),
            Err(e) => warn!(error = %e, "api server config update not delivered"),
        }
    }

    // ── Startup sync ───────────────────────────────────────────────

    /// Wait until the manager reports synced, retrying at the configured
    /// interval. Gives up through the fatal hook after the sync timeout.
    pub async fn wait_for_sync(&self) -> PartitionResult<()> {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if self.is_synced() {
                info!(attempts, "api server config synced");
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= self.settings.sync_timeout {
                let err = PartitionError::SyncTimeout {
                    attempts,
                    elapsed_secs: elapsed.as_secs(),
                };
                (self.fatal)(&err);
                return Err(err);
            }
            warn!(attempts, "api server config not synced yet, retrying");
            tokio::time::sleep(self.settings.sync_retry_interval).await;
        }
    }
}

impl ResourceEventHandler<Endpoints> for ApiServerConfigManager {
    fn on_add(&self, obj: &Endpoints) {
        report(&self.fatal, Endpoints::KIND, self.observe(obj));
    }

    fn on_update(&self, _old: &Endpoints, new: &Endpoints) {
        report(&self.fatal, Endpoints::KIND, self.observe(new));
    }

    fn on_delete(&self, obj: &DeletedObject<Endpoints>) {
        self.observe_delete(obj);
    }
}

/// Whether `endpoints` is the API-server endpoints object.
pub fn is_api_server_endpoints(endpoints: &Endpoints) -> bool {
    let meta = &endpoints.metadata;
    meta.name == KUBERNETES_SERVICE_NAME
        && meta.namespace == DEFAULT_NAMESPACE
        && is_system_tenant(&meta.tenant)
}

/// Index subsets by service group. A group listed twice keeps its first
/// subset.
pub fn endpoint_map(subsets: &[EndpointSubset]) -> EndpointMap {
    let mut map = EndpointMap::new();
    for subset in subsets {
        if map.contains_key(&subset.service_group_id) {
            warn!(service_group_id = %subset.service_group_id, "duplicate subset for service group ignored");
            continue;
        }
        map.insert(subset.service_group_id.clone(), subset.clone());
    }
    map
}
