//! Data partition manager — the key range served by this service group.
//!
//! Exactly one `DataPartitionConfig` may exist per service group. A second
//! one with a different resource version cannot be reconciled and is
//! reported through the fatal hook.

use std::sync::{Arc, RwLock};

use shard_core::{DataPartitionConfig, Resource};
use shardgrid_bcast::{BroadcastGroup, Subscription};
use shardgrid_watch::{DeletedObject, ResourceEventHandler};
use tracing::{debug, info};

use crate::error::{PartitionError, PartitionResult};
use crate::fatal::{FatalHook, exit_process, report};

/// Name of the broadcast group carrying data partition changes.
pub const DATA_PARTITION_GROUP: &str = "data-partition-updates";

#[derive(Default)]
struct State {
    config: Option<DataPartitionConfig>,
    rev: u64,
}

pub struct DataPartitionManager {
    service_group_id: String,
    state: RwLock<State>,
    group: Arc<BroadcastGroup<DataPartitionConfig>>,
    fatal: FatalHook,
}

impl DataPartitionManager {
    pub fn new(service_group_id: &str, group: Arc<BroadcastGroup<DataPartitionConfig>>) -> Self {
        Self {
            service_group_id: service_group_id.to_string(),
            state: RwLock::new(State::default()),
            group,
            fatal: exit_process(),
        }
    }

    pub fn with_fatal_hook(mut self, hook: FatalHook) -> Self {
        self.fatal = hook;
        self
    }

    pub fn service_group_id(&self) -> &str {
        &self.service_group_id
    }

    pub fn subscribe(&self) -> Subscription<DataPartitionConfig> {
        self.group.join()
    }

    /// The config currently in force, if one has been seen.
    pub fn current(&self) -> Option<DataPartitionConfig> {
        self.state.read().expect("data partition lock").config.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().expect("data partition lock").config.is_some()
    }

    /// Whether `key` falls inside the range this group serves. Nothing is
    /// served before the first config arrives.
    pub fn serves(&self, key: &str) -> bool {
        self.state
            .read()
            .expect("data partition lock")
            .config
            .as_ref()
            .is_some_and(|c| c.contains(key))
    }

    fn is_mine(&self, config: &DataPartitionConfig) -> bool {
        if config.service_group_id != self.service_group_id {
            debug!(
                service_group_id = %config.service_group_id,
                mine = %self.service_group_id,
                "data partition config for another service group ignored"
            );
            return false;
        }
        true
    }

    // ── Mutation ───────────────────────────────────────────────────

    pub fn add(&self, config: &DataPartitionConfig) -> PartitionResult<bool> {
        if !self.is_mine(config) {
            return Ok(false);
        }
        let rv = config.revision()?;

        let mut state = self.state.write().expect("data partition lock");
        if let Some(stored) = &state.config {
            if stored.metadata.resource_version == config.metadata.resource_version {
                debug!(rev = rv, "data partition config re-added, unchanged");
                return Ok(false);
            }
            return Err(PartitionError::DivergentDataPartition {
                service_group_id: self.service_group_id.clone(),
                stored: stored.metadata.resource_version.clone(),
                incoming: config.metadata.resource_version.clone(),
            });
        }

        state.config = Some(config.clone());
        state.rev = rv;
        info!(
            service_group_id = %self.service_group_id,
            range_start = %config.range_start,
            range_end = %config.range_end,
            rev = rv,
            "data partition config initialized"
        );
        self.group.send(config.clone())?;
        Ok(true)
    }

    pub fn update(&self, _old: &DataPartitionConfig, new: &DataPartitionConfig) -> PartitionResult<bool> {
        if !self.is_mine(new) {
            return Ok(false);
        }
        let rv = new.revision()?;

        let mut state = self.state.write().expect("data partition lock");
        if state.config.is_none() {
            drop(state);
            return self.add(new);
        }
        if rv <= state.rev {
            debug!(rev = rv, stored = state.rev, "stale data partition update ignored");
            return Ok(false);
        }

        let changed = state.config.as_ref().is_some_and(|c| !c.same_range(new));
        state.config = Some(new.clone());
        state.rev = rv;
        if changed {
            info!(
                service_group_id = %self.service_group_id,
                range_start = %new.range_start,
                range_end = %new.range_end,
                rev = rv,
                "data partition range changed"
            );
            self.group.send(new.clone())?;
        }
        Ok(changed)
    }

    /// Deletion is only observed; the last known range stays in force.
    pub fn delete(&self, obj: &DeletedObject<DataPartitionConfig>) -> PartitionResult<bool> {
        let config = obj.object();
        if self.is_mine(config) {
            info!(
                service_group_id = %self.service_group_id,
                name = %config.metadata.name,
                "data partition config deleted, keeping last known range"
            );
        }
        Ok(false)
    }
}

impl ResourceEventHandler<DataPartitionConfig> for DataPartitionManager {
    fn on_add(&self, obj: &DataPartitionConfig) {
        report(&self.fatal, DataPartitionConfig::KIND, self.add(obj));
    }

    fn on_update(&self, old: &DataPartitionConfig, new: &DataPartitionConfig) {
        report(&self.fatal, DataPartitionConfig::KIND, self.update(old, new));
    }

    fn on_delete(&self, obj: &DeletedObject<DataPartitionConfig>) {
        report(&self.fatal, DataPartitionConfig::KIND, self.delete(obj));
    }
}
