//! Storage cluster manager — `storageClusterId → StorageCluster`.
//!
//! Every accepted change is published as a [`StorageClusterAction`] while
//! the write lock is held, so readers of the group see actions for one id
//! in the order the events were applied.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use shard_core::{Resource, StorageCluster};
use shardgrid_bcast::{BroadcastGroup, Subscription};
use shardgrid_watch::{DeletedObject, ResourceEventHandler};
use tracing::{debug, info, warn};

use crate::error::{PartitionError, PartitionResult};
use crate::fatal::{FatalHook, exit_process, report};

/// Name of the broadcast group carrying storage cluster actions.
pub const STORAGE_CLUSTER_GROUP: &str = "storage-cluster-updates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterAction {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterAction {
    pub storage_cluster_id: u8,
    pub server_addresses: Vec<String>,
    pub action: ClusterAction,
}

struct Entry {
    cluster: StorageCluster,
    rev: u64,
}

#[derive(Default)]
struct State {
    clusters: BTreeMap<u8, Entry>,
    /// Highest revision applied so far.
    rev: u64,
}

pub struct StorageClusterManager {
    state: RwLock<State>,
    group: Arc<BroadcastGroup<StorageClusterAction>>,
    fatal: FatalHook,
}

impl StorageClusterManager {
    pub fn new(group: Arc<BroadcastGroup<StorageClusterAction>>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            group,
            fatal: exit_process(),
        }
    }

    pub fn with_fatal_hook(mut self, hook: FatalHook) -> Self {
        self.fatal = hook;
        self
    }

    /// Join the action group.
    pub fn subscribe(&self) -> Subscription<StorageClusterAction> {
        self.group.join()
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Apply an add. Returns whether the map changed.
    pub fn add(&self, cluster: &StorageCluster) -> PartitionResult<bool> {
        let rv = cluster.revision()?;
        let id = cluster.cluster_id()?;
        let name = &cluster.metadata.name;

        let mut state = self.state.write().expect("storage cluster lock");
        if let Some(existing) = state.clusters.get(&id) {
            if existing.cluster.metadata.name != *name {
                return Err(PartitionError::DuplicateStorageCluster {
                    id,
                    existing: existing.cluster.metadata.name.clone(),
                    incoming: name.clone(),
                });
            }
            if rv <= existing.rev {
                debug!(id, %name, rev = rv, stored = existing.rev, "stale storage cluster add ignored");
                return Ok(false);
            }
            // Re-add of a known cluster (relist): same rules as an update.
            return self.apply_update(&mut state, id, cluster, rv);
        }

        state.clusters.insert(
            id,
            Entry {
                cluster: cluster.clone(),
                rev: rv,
            },
        );
        state.rev = state.rev.max(rv);
        info!(id, %name, addresses = %cluster.service_address, rev = rv, "storage cluster added");
        self.publish(id, cluster.server_addresses(), ClusterAction::Add)?;
        Ok(true)
    }

    /// Apply an update. Returns whether the map changed.
    pub fn update(&self, old: &StorageCluster, new: &StorageCluster) -> PartitionResult<bool> {
        let rv = new.revision()?;
        let id = new.cluster_id()?;
        let old_id = old.cluster_id()?;
        if old_id != id {
            warn!(
                name = %new.metadata.name,
                old = old_id,
                new = id,
                "storage cluster id cannot change, update ignored"
            );
            return Ok(false);
        }

        let mut state = self.state.write().expect("storage cluster lock");
        let Some(stored_rev) = state.clusters.get(&id).map(|e| e.rev) else {
            drop(state);
            debug!(id, "update for unknown storage cluster, treating as add");
            return self.add(new);
        };
        if rv <= stored_rev {
            debug!(id, rev = rv, stored = stored_rev, "stale storage cluster update ignored");
            return Ok(false);
        }
        self.apply_update(&mut state, id, new, rv)
    }

    fn apply_update(
        &self,
        state: &mut State,
        id: u8,
        new: &StorageCluster,
        rv: u64,
    ) -> PartitionResult<bool> {
        let Some(entry) = state.clusters.get_mut(&id) else {
            return Ok(false);
        };
        let address_changed = entry.cluster.service_address != new.service_address;
        entry.cluster = new.clone();
        entry.rev = rv;
        state.rev = state.rev.max(rv);

        if address_changed {
            info!(id, addresses = %new.service_address, rev = rv, "storage cluster addresses changed");
            self.publish(id, new.server_addresses(), ClusterAction::Update)?;
        } else {
            debug!(id, rev = rv, "storage cluster metadata updated");
        }
        Ok(true)
    }

    /// Apply a delete (typed or tombstone). Returns whether the map changed.
    pub fn delete(&self, obj: &DeletedObject<StorageCluster>) -> PartitionResult<bool> {
        let cluster = obj.object();
        let id = cluster.cluster_id()?;

        let mut state = self.state.write().expect("storage cluster lock");
        let Some(removed) = state.clusters.remove(&id) else {
            debug!(id, "delete for unknown storage cluster ignored");
            return Ok(false);
        };
        if let Ok(rv) = cluster.revision() {
            state.rev = state.rev.max(rv);
        }
        info!(id, name = %removed.cluster.metadata.name, tombstone = obj.is_tombstone(), "storage cluster deleted");
        self.publish(id, removed.cluster.server_addresses(), ClusterAction::Delete)?;
        Ok(true)
    }

    fn publish(&self, id: u8, server_addresses: Vec<String>, action: ClusterAction) -> PartitionResult<()> {
        self.group.send(StorageClusterAction {
            storage_cluster_id: id,
            server_addresses,
            action,
        })?;
        Ok(())
    }

    // ── Readers ────────────────────────────────────────────────────

    pub fn get(&self, id: u8) -> Option<StorageCluster> {
        let state = self.state.read().expect("storage cluster lock");
        state.clusters.get(&id).map(|e| e.cluster.clone())
    }

    pub fn server_addresses(&self, id: u8) -> Option<Vec<String>> {
        self.get(id).map(|c| c.server_addresses())
    }

    /// All known clusters ordered by id.
    pub fn clusters(&self) -> Vec<StorageCluster> {
        let state = self.state.read().expect("storage cluster lock");
        state.clusters.values().map(|e| e.cluster.clone()).collect()
    }

    pub fn rev(&self) -> u64 {
        self.state.read().expect("storage cluster lock").rev
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("storage cluster lock").clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceEventHandler<StorageCluster> for StorageClusterManager {
    fn on_add(&self, obj: &StorageCluster) {
        report(&self.fatal, StorageCluster::KIND, self.add(obj));
    }

    fn on_update(&self, old: &StorageCluster, new: &StorageCluster) {
        report(&self.fatal, StorageCluster::KIND, self.update(old, new));
    }

    fn on_delete(&self, obj: &DeletedObject<StorageCluster>) {
        report(&self.fatal, StorageCluster::KIND, self.delete(obj));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fatal::RecordingHook;

    fn manager() -> (StorageClusterManager, Subscription<StorageClusterAction>, RecordingHook) {
        let group = Arc::new(BroadcastGroup::new(STORAGE_CLUSTER_GROUP, 16));
        let hook = RecordingHook::new();
        let mgr = StorageClusterManager::new(group).with_fatal_hook(hook.hook());
        let sub = mgr.subscribe();
        (mgr, sub, hook)
    }

    #[test]
    fn add_update_delete_sequence() {
        let (mgr, mut sub, _) = manager();
        let c1 = StorageCluster::new("cluster-1", "1", "10.0.0.1", 100);

        assert!(mgr.add(&c1).unwrap());
        assert_eq!(mgr.get(1).unwrap().metadata.name, "cluster-1");

        let stale = StorageCluster::new("cluster-1", "1", "10.0.0.1", 99);
        assert!(!mgr.update(&c1, &stale).unwrap());
        assert_eq!(mgr.rev(), 100);

        let renamed = StorageCluster::new("cluster-2", "1", "10.0.0.1", 101);
        assert!(mgr.update(&c1, &renamed).unwrap());
        assert_eq!(mgr.get(1).unwrap().metadata.name, "cluster-2");

        let other = StorageCluster::new("cluster-9", "2", "10.0.0.9", 105);
        assert!(!mgr.delete(&DeletedObject::Object(other)).unwrap());
        assert_eq!(mgr.len(), 1);

        let gone = StorageCluster::new("cluster-2", "1", "10.0.0.1", 110);
        assert!(mgr.delete(&DeletedObject::Object(gone)).unwrap());
        assert!(mgr.is_empty());
        assert_eq!(mgr.rev(), 110);

        // Metadata-only update emitted nothing.
        let actions: Vec<ClusterAction> = std::iter::from_fn(|| sub.try_read())
            .map(|e| e.message.action)
            .collect();
        assert_eq!(actions, vec![ClusterAction::Add, ClusterAction::Delete]);
    }

    #[test]
    fn address_change_publishes_update() {
        let (mgr, mut sub, _) = manager();
        let c1 = StorageCluster::new("c1", "3", "10.0.0.1", 1);
        mgr.add(&c1).unwrap();
        let moved = StorageCluster::new("c1", "3", "10.0.0.1, 10.0.0.2", 2);
        mgr.update(&c1, &moved).unwrap();

        sub.try_read().unwrap();
        let update = sub.try_read().unwrap().message;
        assert_eq!(
            update,
            StorageClusterAction {
                storage_cluster_id: 3,
                server_addresses: vec!["10.0.0.1".into(), "10.0.0.2".into()],
                action: ClusterAction::Update,
            }
        );
    }

    #[test]
    fn duplicate_id_is_fatal() {
        let (mgr, _sub, hook) = manager();
        mgr.on_add(&StorageCluster::new("c1", "4", "10.0.0.1", 1));
        mgr.on_add(&StorageCluster::new("c2", "4", "10.0.0.2", 2));

        assert_eq!(hook.calls().len(), 1);
        assert!(hook.calls()[0].contains("already owned by c1"));
        assert_eq!(mgr.get(4).unwrap().metadata.name, "c1");
    }

    #[test]
    fn tombstone_delete_removes_entry() {
        let (mgr, _sub, _) = manager();
        let c1 = StorageCluster::new("c1", "5", "10.0.0.1", 1);
        mgr.add(&c1).unwrap();
        mgr.on_delete(&DeletedObject::Tombstone {
            key: "c1".into(),
            last_known: c1,
        });
        assert!(mgr.get(5).is_none());
    }

    #[test]
    fn bad_cluster_id_is_not_fatal() {
        let (mgr, _sub, hook) = manager();
        mgr.on_add(&StorageCluster::new("c1", "not-a-number", "10.0.0.1", 1));
        assert!(!hook.fired());
        assert!(mgr.is_empty());
    }

    #[test]
    fn rev_discipline_is_per_cluster() {
        let (mgr, _sub, _) = manager();
        mgr.add(&StorageCluster::new("c1", "1", "a", 50)).unwrap();
        // A different cluster with a lower revision is still new to us.
        assert!(mgr.add(&StorageCluster::new("c2", "2", "b", 40)).unwrap());
        assert_eq!(mgr.rev(), 50);
    }
}
