use async_trait::async_trait;
use model::records::batch::RowBatch;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("write failed for `{fqtn}`: {reason}")]
    Write { fqtn: String, reason: String },
}

/// The target side of a snapshot. Implementations must tolerate concurrent
/// pushes for different table parts.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn push(&self, batch: RowBatch) -> Result<(), SinkError>;
}
