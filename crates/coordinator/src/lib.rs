use async_trait::async_trait;
use model::core::identifiers::{OperationId, TransferId};
use model::endpoint::Source;
use model::table::OperationTablePart;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod error;
pub mod memory;
pub mod sled_store;

pub use error::CoordinatorError;
pub use memory::InMemoryCoordinator;
pub use sled_store::SledCoordinator;

/// A named blob of persisted state scoped to one transfer, e.g. a resumption
/// checkpoint. Opaque to the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferStateData {
    pub payload: serde_json::Value,
}

impl TransferStateData {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }
}

/// Durable storage shared by every worker of a transfer: operation state,
/// named transfer-state blobs, per-part snapshot progress and the persisted
/// endpoint record.
///
/// Implementations are internally synchronized; callers never lock around
/// coordinator calls. When a transfer is sharded across processes the
/// coordinator is the single source of truth, and
/// [`update_operation_tables_parts`](Coordinator::update_operation_tables_parts)
/// is the serialization point merging the workers' views: parts are upserted
/// by identity key, last writer wins per key, so shards reporting disjoint
/// key sets never lose each other's parts.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Overwrites the status string for an operation. Idempotent.
    async fn set_operation_state(
        &self,
        operation_id: &OperationId,
        state: &str,
    ) -> Result<(), CoordinatorError>;

    /// Fails with [`CoordinatorError::OperationStateNotFound`] when the
    /// operation was never set.
    async fn get_operation_state(
        &self,
        operation_id: &OperationId,
    ) -> Result<String, CoordinatorError>;

    /// Returns an empty mapping, not an error, when no state exists yet.
    async fn get_transfer_state(
        &self,
        transfer_id: &TransferId,
    ) -> Result<HashMap<String, TransferStateData>, CoordinatorError>;

    /// Merges the given entries into the stored state: only the named keys
    /// are overwritten, other keys are untouched. All-or-nothing for the
    /// given batch.
    async fn set_transfer_state(
        &self,
        transfer_id: &TransferId,
        state: HashMap<String, TransferStateData>,
    ) -> Result<(), CoordinatorError>;

    /// Removes the named keys; removing an absent key is a no-op.
    async fn remove_transfer_state(
        &self,
        transfer_id: &TransferId,
        keys: &[String],
    ) -> Result<(), CoordinatorError>;

    async fn update_operation_tables_parts(
        &self,
        operation_id: &OperationId,
        parts: &[OperationTablePart],
    ) -> Result<(), CoordinatorError>;

    /// Read-only snapshot of the tracked parts, in stable key order.
    async fn get_operation_tables_parts(
        &self,
        operation_id: &OperationId,
    ) -> Result<Vec<OperationTablePart>, CoordinatorError>;

    /// `for_update` signals the caller intends to write the endpoint back.
    /// It is a hint, not a lock.
    async fn get_endpoint(
        &self,
        transfer_id: &TransferId,
        for_update: bool,
    ) -> Result<Source, CoordinatorError>;

    async fn update_endpoint(
        &self,
        transfer_id: &TransferId,
        endpoint: Source,
    ) -> Result<(), CoordinatorError>;
}
