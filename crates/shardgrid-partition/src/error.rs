//! Error types for the partition managers.

use shard_core::CoreError;
use shardgrid_bcast::BroadcastError;
use thiserror::Error;

/// Result type alias for partition manager operations.
pub type PartitionResult<T> = Result<T, PartitionError>;

#[derive(Debug, Error)]
pub enum PartitionError {
    /// Two storage clusters claim the same id.
    #[error("storage cluster id {id} claimed by {incoming} but already owned by {existing}")]
    DuplicateStorageCluster {
        id: u8,
        existing: String,
        incoming: String,
    },

    /// A second data-partition config appeared for the same service group.
    #[error(
        "service group {service_group_id} already has data partition config at resource version {stored}, got {incoming}"
    )]
    DivergentDataPartition {
        service_group_id: String,
        stored: String,
        incoming: String,
    },

    /// A process-wide manager was constructed twice.
    #[error("{0} constructed more than once in this process")]
    SingletonViolation(&'static str),

    /// API-server config never synced within the allowed window.
    #[error("api server config not synced after {attempts} attempts over {elapsed_secs}s")]
    SyncTimeout { attempts: u32, elapsed_secs: u64 },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}

impl PartitionError {
    /// Whether this error means an invariant broke that cannot be repaired
    /// inside the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PartitionError::DuplicateStorageCluster { .. }
                | PartitionError::DivergentDataPartition { .. }
                | PartitionError::SingletonViolation(_)
                | PartitionError::SyncTimeout { .. }
        )
    }
}
