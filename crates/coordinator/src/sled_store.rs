use crate::{Coordinator, CoordinatorError, TransferStateData};
use async_trait::async_trait;
use model::core::identifiers::{OperationId, TransferId};
use model::endpoint::Source;
use model::table::OperationTablePart;
use std::collections::HashMap;
use std::path::Path;

/// Durable single-node coordinator backed by sled. State survives process
/// restarts, which is what makes a snapshot resumable after a crash.
pub struct SledCoordinator {
    db: sled::Db,
}

impl SledCoordinator {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoordinatorError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    #[inline]
    fn opstate_key(operation_id: &OperationId) -> String {
        format!("opstate:{}", operation_id)
    }

    #[inline]
    fn state_prefix(transfer_id: &TransferId) -> String {
        format!("state:{}:", transfer_id)
    }

    #[inline]
    fn parts_prefix(operation_id: &OperationId) -> String {
        format!("parts:{}:", operation_id)
    }

    #[inline]
    fn endpoint_key(transfer_id: &TransferId) -> String {
        format!("endpoint:{}", transfer_id)
    }
}

fn codec_err(err: impl std::fmt::Display) -> CoordinatorError {
    CoordinatorError::Codec(err.to_string())
}

#[async_trait]
impl Coordinator for SledCoordinator {
    async fn set_operation_state(
        &self,
        operation_id: &OperationId,
        state: &str,
    ) -> Result<(), CoordinatorError> {
        self.db
            .insert(Self::opstate_key(operation_id), state.as_bytes())?;
        Ok(())
    }

    async fn get_operation_state(
        &self,
        operation_id: &OperationId,
    ) -> Result<String, CoordinatorError> {
        match self.db.get(Self::opstate_key(operation_id))? {
            Some(bytes) => String::from_utf8(bytes.to_vec()).map_err(codec_err),
            None => Err(CoordinatorError::OperationStateNotFound(
                operation_id.clone(),
            )),
        }
    }

    async fn get_transfer_state(
        &self,
        transfer_id: &TransferId,
    ) -> Result<HashMap<String, TransferStateData>, CoordinatorError> {
        let prefix = Self::state_prefix(transfer_id);
        let mut state = HashMap::new();
        for item in self.db.scan_prefix(&prefix) {
            let (key, value) = item?;
            let key = String::from_utf8(key[prefix.len()..].to_vec()).map_err(codec_err)?;
            let data: TransferStateData = serde_json::from_slice(&value).map_err(codec_err)?;
            state.insert(key, data);
        }
        Ok(state)
    }

    async fn set_transfer_state(
        &self,
        transfer_id: &TransferId,
        state: HashMap<String, TransferStateData>,
    ) -> Result<(), CoordinatorError> {
        let prefix = Self::state_prefix(transfer_id);
        let mut batch = sled::Batch::default();
        for (key, value) in &state {
            let encoded = serde_json::to_vec(value).map_err(codec_err)?;
            batch.insert(format!("{prefix}{key}").into_bytes(), encoded);
        }
        // One atomic batch: the named keys land together or not at all.
        self.db.apply_batch(batch)?;
        Ok(())
    }

    async fn remove_transfer_state(
        &self,
        transfer_id: &TransferId,
        keys: &[String],
    ) -> Result<(), CoordinatorError> {
        let prefix = Self::state_prefix(transfer_id);
        let mut batch = sled::Batch::default();
        for key in keys {
            batch.remove(format!("{prefix}{key}").into_bytes());
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    async fn update_operation_tables_parts(
        &self,
        operation_id: &OperationId,
        parts: &[OperationTablePart],
    ) -> Result<(), CoordinatorError> {
        let prefix = Self::parts_prefix(operation_id);
        let mut batch = sled::Batch::default();
        for part in parts {
            let encoded = bincode::serialize(part).map_err(codec_err)?;
            batch.insert(format!("{prefix}{}", part.key()).into_bytes(), encoded);
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    async fn get_operation_tables_parts(
        &self,
        operation_id: &OperationId,
    ) -> Result<Vec<OperationTablePart>, CoordinatorError> {
        let mut parts = Vec::new();
        for item in self.db.scan_prefix(Self::parts_prefix(operation_id)) {
            let (_key, value) = item?;
            parts.push(bincode::deserialize(&value).map_err(codec_err)?);
        }
        Ok(parts)
    }

    async fn get_endpoint(
        &self,
        transfer_id: &TransferId,
        _for_update: bool,
    ) -> Result<Source, CoordinatorError> {
        match self.db.get(Self::endpoint_key(transfer_id))? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(codec_err),
            None => Err(CoordinatorError::EndpointNotFound(transfer_id.clone())),
        }
    }

    async fn update_endpoint(
        &self,
        transfer_id: &TransferId,
        endpoint: Source,
    ) -> Result<(), CoordinatorError> {
        let encoded = serde_json::to_vec(&endpoint).map_err(codec_err)?;
        self.db.insert(Self::endpoint_key(transfer_id), encoded)?;
        Ok(())
    }
}
