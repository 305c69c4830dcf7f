use crate::{Coordinator, CoordinatorError, TransferStateData};
use async_trait::async_trait;
use model::core::identifiers::{OperationId, TransferId};
use model::endpoint::Source;
use model::table::OperationTablePart;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Inner {
    operation_state: HashMap<OperationId, String>,
    transfer_state: HashMap<TransferId, HashMap<String, TransferStateData>>,
    parts: HashMap<OperationId, BTreeMap<String, OperationTablePart>>,
    endpoints: HashMap<TransferId, Source>,
}

/// Coordinator for single-process transfers and tests. Same observable
/// semantics as the durable implementation.
#[derive(Default)]
pub struct InMemoryCoordinator {
    inner: Mutex<Inner>,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the endpoint record, as a deployed control plane would have
    /// done when the transfer was created.
    pub fn with_endpoint(transfer_id: TransferId, endpoint: Source) -> Self {
        let coordinator = Self::new();
        coordinator
            .inner
            .lock()
            .unwrap()
            .endpoints
            .insert(transfer_id, endpoint);
        coordinator
    }
}

#[async_trait]
impl Coordinator for InMemoryCoordinator {
    async fn set_operation_state(
        &self,
        operation_id: &OperationId,
        state: &str,
    ) -> Result<(), CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .operation_state
            .insert(operation_id.clone(), state.to_string());
        Ok(())
    }

    async fn get_operation_state(
        &self,
        operation_id: &OperationId,
    ) -> Result<String, CoordinatorError> {
        let inner = self.inner.lock().unwrap();
        inner
            .operation_state
            .get(operation_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::OperationStateNotFound(operation_id.clone()))
    }

    async fn get_transfer_state(
        &self,
        transfer_id: &TransferId,
    ) -> Result<HashMap<String, TransferStateData>, CoordinatorError> {
        let inner = self.inner.lock().unwrap();
        let state = inner.transfer_state.get(transfer_id).cloned();
        debug!(transfer_id = %transfer_id, keys = state.as_ref().map(|s| s.len()).unwrap_or(0), "get transfer state");
        Ok(state.unwrap_or_default())
    }

    async fn set_transfer_state(
        &self,
        transfer_id: &TransferId,
        state: HashMap<String, TransferStateData>,
    ) -> Result<(), CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner.transfer_state.entry(transfer_id.clone()).or_default();
        for (key, value) in state {
            stored.insert(key, value);
        }
        Ok(())
    }

    async fn remove_transfer_state(
        &self,
        transfer_id: &TransferId,
        keys: &[String],
    ) -> Result<(), CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(stored) = inner.transfer_state.get_mut(transfer_id) {
            for key in keys {
                stored.remove(key);
            }
        }
        Ok(())
    }

    async fn update_operation_tables_parts(
        &self,
        operation_id: &OperationId,
        parts: &[OperationTablePart],
    ) -> Result<(), CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner.parts.entry(operation_id.clone()).or_default();
        for part in parts {
            stored.insert(part.key(), part.clone());
        }
        Ok(())
    }

    async fn get_operation_tables_parts(
        &self,
        operation_id: &OperationId,
    ) -> Result<Vec<OperationTablePart>, CoordinatorError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .parts
            .get(operation_id)
            .map(|parts| parts.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_endpoint(
        &self,
        transfer_id: &TransferId,
        _for_update: bool,
    ) -> Result<Source, CoordinatorError> {
        let inner = self.inner.lock().unwrap();
        inner
            .endpoints
            .get(transfer_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::EndpointNotFound(transfer_id.clone()))
    }

    async fn update_endpoint(
        &self,
        transfer_id: &TransferId,
        endpoint: Source,
    ) -> Result<(), CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.endpoints.insert(transfer_id.clone(), endpoint);
        Ok(())
    }
}
