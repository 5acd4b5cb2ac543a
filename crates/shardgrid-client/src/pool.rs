//! Dynamic REST client pool.
//!
//! Holds one client per API-server group and swaps the whole set when the
//! API-server config changes.
//!
//! ```text
//!   ApiServerConfigUpdate ──► run() ──► rebuild() ──► latch.done()
//!                                          │
//!                              write lock, new Vec<Arc<C>>
//!
//!   rest_client()   random pick        (writes)
//!   list()          walk until a shard answers, remember it
//!   watch()         one sub-watch per client, merged by AggregatedWatcher
//! ```
//!
//! Requests already running against a replaced client are left alone.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use rand::seq::SliceRandom;
use serde_json::Value;
use shard_core::config::ClientConfig;
use shardgrid_bcast::{DrainLatch, Subscription};
use shardgrid_partition::{ApiServerConfigUpdate, EndpointMap, endpoint_urls};
use shardgrid_watch::{AggregatedWatch, AggregatedWatcher, ObjectList, WatchError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::request::{ListOptions, ResourcePath};
use crate::rest::RestClient;

/// Group name given to the client built from the bootstrap URL.
pub const BOOTSTRAP_GROUP: &str = "bootstrap";

/// Builds a client for a base URL.
pub type ClientFactory<C> = Arc<dyn Fn(&str) -> ClientResult<C> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub scheme: String,
    pub default_port: u16,
    /// Accept a watch when only some shards could be reached.
    pub allow_partial_watch: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for PoolSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            scheme: config.scheme.clone(),
            default_port: config.port,
            allow_partial_watch: config.allow_partial_watch,
        }
    }
}

struct Member<C> {
    group: String,
    client: Arc<C>,
}

struct State<C> {
    members: Vec<Member<C>>,
    generation: u64,
}

pub struct ClientPool<C> {
    settings: PoolSettings,
    factory: ClientFactory<C>,
    state: RwLock<State<C>>,
    /// Base URL of the client that last answered a list.
    last_good: Mutex<Option<String>>,
}

impl<C: RestClient> ClientPool<C> {
    /// A pool holding only `bootstrap` until the first config update.
    pub fn new(settings: PoolSettings, factory: ClientFactory<C>, bootstrap: C) -> Self {
        Self {
            settings,
            factory,
            state: RwLock::new(State {
                members: vec![Member {
                    group: BOOTSTRAP_GROUP.to_string(),
                    client: Arc::new(bootstrap),
                }],
                generation: 0,
            }),
            last_good: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// One client picked uniformly at random.
    pub fn rest_client(&self) -> ClientResult<Arc<C>> {
        let state = self.state.read().expect("client pool lock");
        state
            .members
            .choose(&mut rand::thread_rng())
            .map(|m| Arc::clone(&m.client))
            .ok_or(ClientError::NoClients)
    }

    /// Every client, for calls that must fan out.
    pub fn rest_clients(&self) -> Vec<Arc<C>> {
        let state = self.state.read().expect("client pool lock");
        state.members.iter().map(|m| Arc::clone(&m.client)).collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("client pool lock").members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of completed rebuilds.
    pub fn generation(&self) -> u64 {
        self.state.read().expect("client pool lock").generation
    }

    /// `group → base URL` of the current clients.
    pub fn targets(&self) -> BTreeMap<String, String> {
        let state = self.state.read().expect("client pool lock");
        state
            .members
            .iter()
            .map(|m| (m.group.clone(), m.client.base_url().to_string()))
            .collect()
    }

    // ── Reconfiguration ───────────────────────────────────────────

    /// Replace every client with one per group in `endpoints`.
    ///
    /// Groups whose client cannot be built are skipped. If none can be
    /// built the current clients stay in place and an error is returned.
    pub fn rebuild(&self, endpoints: &EndpointMap) -> ClientResult<usize> {
        let urls = endpoint_urls(endpoints, &self.settings.scheme, self.settings.default_port);
        let mut members = Vec::with_capacity(urls.len());
        let mut first_err = None;
        for (group, url) in urls {
            match (self.factory)(&url) {
                Ok(client) => members.push(Member {
                    group,
                    client: Arc::new(client),
                }),
                Err(e) => {
                    warn!(group = %group, url = %url, error = %e, "rest client not built");
                    first_err.get_or_insert(e);
                }
            }
        }
        if members.is_empty() {
            return Err(first_err.unwrap_or(ClientError::NoClients));
        }

        let count = members.len();
        let mut state = self.state.write().expect("client pool lock");
        state.members = members;
        state.generation += 1;
        let generation = state.generation;
        drop(state);

        *self.last_good.lock().expect("client pool last-good lock") = None;
        info!(clients = count, generation, "rest clients rebuilt");
        Ok(count)
    }

    /// Rebuild on every API-server config update, releasing one slot of
    /// `latch` per update delivered or missed.
    pub fn run(
        self: Arc<Self>,
        mut updates: Subscription<ApiServerConfigUpdate>,
        latch: Arc<DrainLatch>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let envelope = tokio::select! {
                    _ = stop_requested(&mut shutdown) => break,
                    envelope = updates.read() => match envelope {
                        Some(envelope) => envelope,
                        None => {
                            debug!("api server config group closed");
                            break;
                        }
                    },
                };
                if envelope.lagged() {
                    debug!(missed = envelope.missed, "config updates missed, using latest");
                }
                if let Err(e) = self.rebuild(&envelope.message.endpoints) {
                    warn!(error = %e, "rest client rebuild failed, keeping current clients");
                }
                for _ in 0..=envelope.missed {
                    latch.done();
                }
            }
            debug!("client pool stopped");
        })
    }

    // ── Fan-out reads ─────────────────────────────────────────────

    /// List from whichever client holds the data.
    ///
    /// The last client that answered is tried first. A not-my-shard
    /// refusal moves on to the next client; any other error is returned
    /// at once.
    pub async fn list(&self, path: &ResourcePath, opts: &ListOptions) -> ClientResult<ObjectList<Value>> {
        let clients = self.preferred_order();
        if clients.is_empty() {
            return Err(ClientError::NoClients);
        }

        let mut last_refusal = None;
        for client in clients {
            match client.list(path, opts).await {
                Ok(list) => {
                    self.remember(client.base_url());
                    return Ok(list);
                }
                Err(e) if e.is_not_my_shard() => {
                    debug!(url = %client.base_url(), path = %path.collection(), "shard not held, trying next client");
                    self.forget(client.base_url());
                    last_refusal = Some(e);
                }
                Err(e) => {
                    self.forget(client.base_url());
                    return Err(e);
                }
            }
        }
        Err(last_refusal.unwrap_or(ClientError::NoClients))
    }

    /// Watch every shard at once.
    ///
    /// Failed sub-watches are recorded on the aggregated watcher. Unless
    /// partial watches are allowed, any failure fails the whole call; a
    /// call where every sub-watch failed always fails.
    pub async fn watch(&self, path: &ResourcePath, opts: &ListOptions) -> ClientResult<AggregatedWatch<Value>> {
        let clients = self.rest_clients();
        if clients.is_empty() {
            return Err(ClientError::NoClients);
        }

        let mut results = Vec::with_capacity(clients.len());
        for client in &clients {
            results.push((client.base_url().to_string(), client.watch(path, opts).await));
        }

        let agg: AggregatedWatcher<Value> = AggregatedWatcher::new();
        let mut failed = 0;
        for (url, result) in results {
            match result {
                Ok(watch) => {
                    agg.add_watch_interface(Some(watch), None);
                }
                Err(e) => {
                    failed += 1;
                    warn!(url = %url, error = %e, "sub-watch failed");
                    agg.add_watch_interface(None, Some(WatchError::Source(format!("{url}: {e}"))));
                }
            }
        }

        if failed == clients.len() || (failed > 0 && !self.settings.allow_partial_watch) {
            let err = agg.errors();
            agg.stop().await;
            return Err(err.map(ClientError::Watch).unwrap_or(ClientError::NoClients));
        }
        Ok(agg.into_watch())
    }

    // ── Single-client writes ──────────────────────────────────────

    pub async fn get(&self, path: &ResourcePath, name: &str) -> ClientResult<Value> {
        self.rest_client()?.get(path, name).await
    }

    pub async fn create(&self, path: &ResourcePath, body: &Value) -> ClientResult<Value> {
        self.rest_client()?.create(path, body).await
    }

    pub async fn update(&self, path: &ResourcePath, name: &str, body: &Value) -> ClientResult<Value> {
        self.rest_client()?.update(path, name, body).await
    }

    pub async fn patch(&self, path: &ResourcePath, name: &str, body: &Value) -> ClientResult<Value> {
        self.rest_client()?.patch(path, name, body).await
    }

    pub async fn delete(&self, path: &ResourcePath, name: &str) -> ClientResult<Value> {
        self.rest_client()?.delete(path, name).await
    }

    // ── Internals ─────────────────────────────────────────────────

    fn preferred_order(&self) -> Vec<Arc<C>> {
        let mut clients = self.rest_clients();
        let preferred = self.last_good.lock().expect("client pool last-good lock").clone();
        if let Some(pos) = preferred.and_then(|url| clients.iter().position(|c| c.base_url() == url)) {
            let client = clients.remove(pos);
            clients.insert(0, client);
        }
        clients
    }

    fn remember(&self, url: &str) {
        let mut last = self.last_good.lock().expect("client pool last-good lock");
        if last.as_deref() != Some(url) {
            debug!(url, "remembering list client");
            *last = Some(url.to_string());
        }
    }

    fn forget(&self, url: &str) {
        let mut last = self.last_good.lock().expect("client pool last-good lock");
        if last.as_deref() == Some(url) {
            *last = None;
        }
    }
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeRestClient;
    use shard_core::{EndpointAddress, EndpointSubset, WatchEvent};
    use shardgrid_bcast::BroadcastGroup;
    use shardgrid_watch::WatchInterface;

    fn fake_factory() -> ClientFactory<FakeRestClient> {
        Arc::new(|url: &str| -> ClientResult<FakeRestClient> { Ok(FakeRestClient::new(url)) })
    }

    fn endpoints(groups: &[(&str, &str)]) -> EndpointMap {
        groups
            .iter()
            .map(|(group, ip)| {
                (
                    group.to_string(),
                    EndpointSubset {
                        addresses: vec![EndpointAddress {
                            ip: ip.to_string(),
                            hostname: String::new(),
                        }],
                        ports: vec![],
                        service_group_id: group.to_string(),
                    },
                )
            })
            .collect()
    }

    fn pool(groups: &[(&str, &str)]) -> ClientPool<FakeRestClient> {
        let pool = ClientPool::new(
            PoolSettings::default(),
            fake_factory(),
            FakeRestClient::new("http://bootstrap:8080"),
        );
        pool.rebuild(&endpoints(groups)).unwrap();
        pool
    }

    fn list_of(n: usize) -> ObjectList<Value> {
        ObjectList {
            items: (0..n).map(|i| serde_json::json!({ "i": i })).collect(),
            resource_version: "7".into(),
        }
    }

    fn not_my_shard() -> ClientError {
        ClientError::Forbidden {
            message: "no relationship found between node 'n1' and this object".into(),
        }
    }

    #[test]
    fn starts_with_bootstrap_client() {
        let pool = ClientPool::new(
            PoolSettings::default(),
            fake_factory(),
            FakeRestClient::new("http://bootstrap:8080"),
        );
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.targets()[BOOTSTRAP_GROUP], "http://bootstrap:8080");
        assert_eq!(pool.rest_client().unwrap().base_url(), "http://bootstrap:8080");
    }

    #[test]
    fn rebuild_creates_one_client_per_group() {
        let pool = pool(&[("1", "10.0.0.1"), ("2", "10.0.0.2")]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.generation(), 1);
        assert_eq!(pool.targets()["2"], "http://10.0.0.2:8080");

        for _ in 0..20 {
            let url = pool.rest_client().unwrap().base_url().to_string();
            assert!(url == "http://10.0.0.1:8080" || url == "http://10.0.0.2:8080");
        }
    }

    #[test]
    fn failed_rebuild_keeps_clients() {
        let pool: ClientPool<FakeRestClient> = ClientPool::new(
            PoolSettings::default(),
            Arc::new(|url: &str| -> ClientResult<FakeRestClient> {
                Err(ClientError::InvalidUrl {
                    url: url.to_string(),
                    reason: "refused".into(),
                })
            }),
            FakeRestClient::new("http://bootstrap:8080"),
        );
        assert!(pool.rebuild(&endpoints(&[("1", "10.0.0.1")])).is_err());
        assert!(pool.rebuild(&EndpointMap::new()).is_err());
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.generation(), 0);
    }

    #[tokio::test]
    async fn list_skips_shards_that_do_not_hold_data() {
        let pool = pool(&[("1", "10.0.0.1"), ("2", "10.0.0.2"), ("3", "10.0.0.3")]);
        let clients = pool.rest_clients();
        clients[0].set_default_list(Err(not_my_shard()));
        clients[1].set_default_list(Ok(list_of(2)));
        clients[2].set_default_list(Err(not_my_shard()));

        let path = ResourcePath::core("v1", "pods");
        let list = pool.list(&path, &ListOptions::default()).await.unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(clients[0].list_calls(), 1);
        assert_eq!(clients[2].list_calls(), 0);

        // The answering client is tried first next time.
        pool.list(&path, &ListOptions::default()).await.unwrap();
        assert_eq!(clients[0].list_calls(), 1);
        assert_eq!(clients[1].list_calls(), 2);
    }

    #[tokio::test]
    async fn list_short_circuits_on_other_errors() {
        let pool = pool(&[("1", "10.0.0.1"), ("2", "10.0.0.2")]);
        let clients = pool.rest_clients();
        clients[0].set_default_list(Err(ClientError::Status {
            code: 500,
            message: "boom".into(),
        }));

        let err = pool
            .list(&ResourcePath::core("v1", "pods"), &ListOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(clients[1].list_calls(), 0);
    }

    #[tokio::test]
    async fn list_reports_refusal_when_no_shard_answers() {
        let pool = pool(&[("1", "10.0.0.1"), ("2", "10.0.0.2")]);
        for client in pool.rest_clients() {
            client.set_default_list(Err(not_my_shard()));
        }
        let err = pool
            .list(&ResourcePath::core("v1", "pods"), &ListOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_my_shard());
    }

    #[tokio::test]
    async fn remembered_client_is_dropped_after_failure() {
        let pool = pool(&[("1", "10.0.0.1"), ("2", "10.0.0.2")]);
        let clients = pool.rest_clients();
        let path = ResourcePath::core("v1", "pods");
        clients[0].push_list(Err(not_my_shard()));
        clients[1].set_default_list(Ok(list_of(1)));
        pool.list(&path, &ListOptions::default()).await.unwrap();
        assert_eq!(pool.preferred_order()[0].base_url(), "http://10.0.0.2:8080");

        clients[1].push_list(Err(not_my_shard()));
        let list = pool.list(&path, &ListOptions::default()).await.unwrap();
        assert!(list.items.is_empty());
        assert_eq!(pool.preferred_order()[0].base_url(), "http://10.0.0.1:8080");
    }

    #[tokio::test]
    async fn watch_merges_every_shard() {
        let pool = pool(&[("1", "10.0.0.1"), ("2", "10.0.0.2")]);
        let opts = ListOptions::default().with_timeout_seconds(30);
        let mut watch = pool.watch(&ResourcePath::core("v1", "pods"), &opts).await.unwrap();

        for (i, client) in pool.rest_clients().iter().enumerate() {
            assert_eq!(client.watch_options()[0].timeout_seconds, Some(30));
            let tx = client.watch_senders().remove(0);
            assert!(tx.send(WatchEvent::Added(serde_json::json!({ "shard": i }))).await);
        }

        let mut shards = Vec::new();
        for _ in 0..2 {
            match watch.recv().await {
                Some(WatchEvent::Added(v)) => shards.push(v["shard"].as_u64().unwrap()),
                other => panic!("unexpected {other:?}"),
            }
        }
        shards.sort();
        assert_eq!(shards, vec![0, 1]);
        watch.stop();
    }

    #[tokio::test]
    async fn partial_watch_failure_is_surfaced_unless_allowed() {
        let strict = pool(&[("1", "10.0.0.1"), ("2", "10.0.0.2")]);
        strict.rest_clients()[1].fail_watches(ClientError::Status {
            code: 503,
            message: "unavailable".into(),
        });
        let err = strict
            .watch(&ResourcePath::core("v1", "pods"), &ListOptions::default())
            .await
            .err()
            .unwrap();
        match err {
            ClientError::Watch(WatchError::Aggregate(errs)) => {
                assert_eq!(errs.len(), 1);
                assert!(errs[0].contains("10.0.0.2"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let lenient = ClientPool::new(
            PoolSettings {
                allow_partial_watch: true,
                ..PoolSettings::default()
            },
            fake_factory(),
            FakeRestClient::new("http://bootstrap:8080"),
        );
        lenient.rebuild(&endpoints(&[("1", "10.0.0.1"), ("2", "10.0.0.2")])).unwrap();
        lenient.rest_clients()[1].fail_watches(ClientError::Status {
            code: 503,
            message: "unavailable".into(),
        });
        let watch = lenient
            .watch(&ResourcePath::core("v1", "pods"), &ListOptions::default())
            .await
            .unwrap();
        assert!(watch.watcher().errors().is_some());
        assert_eq!(watch.watcher().live_count(), 1);
    }

    #[tokio::test]
    async fn writes_go_to_a_single_client() {
        let pool = pool(&[("1", "10.0.0.1"), ("2", "10.0.0.2")]);
        let path = ResourcePath::core("v1", "pods").in_tenant("te").in_namespace("ns");
        pool.create(&path, &serde_json::json!({})).await.unwrap();
        pool.delete(&path, "p1").await.unwrap();

        let writes: usize = pool.rest_clients().iter().map(|c| c.writes().len()).sum();
        assert_eq!(writes, 2);
    }

    #[tokio::test]
    async fn run_rebuilds_and_releases_latch() {
        let pool = Arc::new(pool(&[("1", "10.0.0.1")]));
        let group = BroadcastGroup::new("api-server-config", 4);
        let latch = Arc::new(DrainLatch::new("clients-must-drain"));
        let (tx, rx) = watch::channel(false);
        let task = pool.clone().run(group.join(), latch.clone(), rx);

        latch.add(group.reader_count());
        group
            .send(ApiServerConfigUpdate {
                endpoints: endpoints(&[("1", "10.0.0.1"), ("2", "10.0.0.2")]),
            })
            .unwrap();
        assert!(latch.wait_timeout(std::time::Duration::from_secs(1)).await);
        assert_eq!(pool.len(), 2);

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
