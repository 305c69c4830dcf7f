use async_trait::async_trait;
use model::transfer::{Transfer, TransferOperation};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("failed to stop job: {0}")]
    Stop(String),

    #[error("failed to start job: {0}")]
    Start(String),
}

/// Control over the transfer's standing replication job. How a job actually
/// runs (process, container, thread) is a deployment concern.
#[async_trait]
pub trait JobControl: Send + Sync {
    async fn stop_job(&self, transfer: &Transfer) -> Result<(), JobError>;

    async fn start_job(
        &self,
        transfer: &Transfer,
        operation: &TransferOperation,
    ) -> Result<(), JobError>;
}

/// Job control for single-process deployments where no standing job exists
/// outside the current invocation.
pub struct NoopJobControl;

#[async_trait]
impl JobControl for NoopJobControl {
    async fn stop_job(&self, transfer: &Transfer) -> Result<(), JobError> {
        info!(transfer_id = %transfer.id, "no standing job to stop");
        Ok(())
    }

    async fn start_job(
        &self,
        transfer: &Transfer,
        operation: &TransferOperation,
    ) -> Result<(), JobError> {
        info!(transfer_id = %transfer.id, operation_id = %operation.operation_id, "no standing job to start");
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("failed to extract schema from source: {0}")]
    Extract(String),

    #[error("failed to apply schema to target: {0}")]
    Apply(String),
}

/// Replicates schema pre-steps (DDL) for a set of tables to the target
/// before their rows are copied.
#[async_trait]
pub trait SchemaApplier: Send + Sync {
    async fn apply_schema(&self, transfer: &Transfer, tables: &[String]) -> Result<(), SchemaError>;
}

/// For targets whose schema is managed out of band.
pub struct NoopSchemaApplier;

#[async_trait]
impl SchemaApplier for NoopSchemaApplier {
    async fn apply_schema(
        &self,
        _transfer: &Transfer,
        _tables: &[String],
    ) -> Result<(), SchemaError> {
        Ok(())
    }
}
