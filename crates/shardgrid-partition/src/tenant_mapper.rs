//! Tenant → storage cluster mapping.
//!
//! A tenant's storage cluster is fixed on first sight. Moving a tenant to
//! another cluster is not supported; such updates are logged and the
//! original assignment is kept.

use std::collections::BTreeMap;
use std::sync::RwLock;

use shard_core::{Resource, SYSTEM_STORAGE_CLUSTER_ID, Tenant, parse_storage_cluster_id};
use shardgrid_watch::{DeletedObject, ResourceEventHandler};
use tracing::{debug, info, warn};

use crate::error::PartitionResult;
use crate::fatal::{FatalHook, exit_process, report};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantAssignment {
    pub cluster_id: u8,
    pub rev: u64,
}

#[derive(Default)]
struct State {
    tenants: BTreeMap<String, TenantAssignment>,
    rev: u64,
}

pub struct TenantStorageMapper {
    state: RwLock<State>,
    fatal: FatalHook,
}

impl Default for TenantStorageMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantStorageMapper {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            fatal: exit_process(),
        }
    }

    pub fn with_fatal_hook(mut self, hook: FatalHook) -> Self {
        self.fatal = hook;
        self
    }

    /// Storage cluster of `tenant`, or the system cluster (0) when the
    /// tenant is unknown.
    pub fn cluster_id_for(&self, tenant: &str) -> u8 {
        self.state
            .read()
            .expect("tenant mapper lock")
            .tenants
            .get(tenant)
            .map(|a| a.cluster_id)
            .unwrap_or(SYSTEM_STORAGE_CLUSTER_ID)
    }

    pub fn assignment(&self, tenant: &str) -> Option<TenantAssignment> {
        self.state.read().expect("tenant mapper lock").tenants.get(tenant).copied()
    }

    /// Snapshot of the whole mapping, ordered by tenant name.
    pub fn mapping(&self) -> BTreeMap<String, u8> {
        let state = self.state.read().expect("tenant mapper lock");
        state
            .tenants
            .iter()
            .map(|(name, a)| (name.clone(), a.cluster_id))
            .collect()
    }

    pub fn rev(&self) -> u64 {
        self.state.read().expect("tenant mapper lock").rev
    }

    // ── Mutation ───────────────────────────────────────────────────

    pub fn add(&self, tenant: &Tenant) -> PartitionResult<bool> {
        let rv = tenant.revision()?;
        let cluster_id = parse_storage_cluster_id(&tenant.spec.storage_cluster_id)?;
        let name = &tenant.metadata.name;

        let mut state = self.state.write().expect("tenant mapper lock");
        match state.tenants.get_mut(name) {
            Some(existing) if rv <= existing.rev => {
                debug!(tenant = %name, rev = rv, stored = existing.rev, "stale tenant add ignored");
                return Ok(false);
            }
            Some(existing) => {
                if existing.cluster_id != cluster_id {
                    warn!(
                        tenant = %name,
                        assigned = existing.cluster_id,
                        requested = cluster_id,
                        "tenant storage migration is not supported, keeping assignment"
                    );
                }
                existing.rev = rv;
            }
            None => {
                state
                    .tenants
                    .insert(name.clone(), TenantAssignment { cluster_id, rev: rv });
                info!(tenant = %name, cluster_id, rev = rv, "tenant mapped to storage cluster");
            }
        }
        state.rev = state.rev.max(rv);
        Ok(true)
    }

    pub fn update(&self, old: &Tenant, new: &Tenant) -> PartitionResult<bool> {
        let rv = new.revision()?;
        let requested = parse_storage_cluster_id(&new.spec.storage_cluster_id)?;
        let old_name = &old.metadata.name;
        let new_name = &new.metadata.name;

        let mut state = self.state.write().expect("tenant mapper lock");
        let Some(current) = state.tenants.get(old_name).copied() else {
            drop(state);
            debug!(tenant = %new_name, "update for unknown tenant, treating as add");
            return self.add(new);
        };
        if rv <= current.rev {
            debug!(tenant = %new_name, rev = rv, stored = current.rev, "stale tenant update ignored");
            return Ok(false);
        }

        if current.cluster_id != requested {
            warn!(
                tenant = %new_name,
                assigned = current.cluster_id,
                requested,
                "tenant storage migration is not supported, keeping assignment"
            );
        }
        if old_name != new_name {
            info!(old = %old_name, new = %new_name, "tenant renamed");
            state.tenants.remove(old_name);
        }
        state.tenants.insert(
            new_name.clone(),
            TenantAssignment {
                cluster_id: current.cluster_id,
                rev: rv,
            },
        );
        state.rev = state.rev.max(rv);
        Ok(true)
    }

    pub fn delete(&self, obj: &DeletedObject<Tenant>) -> PartitionResult<bool> {
        let tenant = obj.object();
        let name = &tenant.metadata.name;
        let mut state = self.state.write().expect("tenant mapper lock");
        if state.tenants.remove(name).is_none() {
            debug!(tenant = %name, "delete for unknown tenant ignored");
            return Ok(false);
        }
        if let Ok(rv) = tenant.revision() {
            state.rev = state.rev.max(rv);
        }
        info!(tenant = %name, "tenant unmapped");
        Ok(true)
    }
}

impl ResourceEventHandler<Tenant> for TenantStorageMapper {
    fn on_add(&self, obj: &Tenant) {
        report(&self.fatal, Tenant::KIND, self.add(obj));
    }

    fn on_update(&self, old: &Tenant, new: &Tenant) {
        report(&self.fatal, Tenant::KIND, self.update(old, new));
    }

    fn on_delete(&self, obj: &DeletedObject<Tenant>) {
        report(&self.fatal, Tenant::KIND, self.delete(obj));
    }
}
