use async_trait::async_trait;
use futures::stream::BoxStream;
use model::core::identifiers::OperationId;
use model::records::batch::RowBatch;
use model::table::{OperationTablePart, TableDescription};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("table discovery failed: {0}")]
    Discovery(String),

    #[error("failed to shard table `{table}`: {reason}")]
    Shard { table: String, reason: String },

    #[error("read failed for `{part}`: {reason}")]
    Read { part: String, reason: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type RowStream = BoxStream<'static, Result<RowBatch, StorageError>>;

/// The source side of a snapshot: discovery, partitioning hints and row
/// reads. How rows are actually fetched (SQL, files, object store) is the
/// implementation's concern; the engine only drives the contract.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// Tables visible to this transfer, already narrowed to the source's
    /// configured scope, with row-count estimates.
    async fn table_list(&self) -> Result<Vec<TableDescription>, StorageError>;

    /// Splits one table into the parts the upload will copy in parallel.
    /// Sources without sharding hints return a single whole-table part.
    async fn shard_table(
        &self,
        operation_id: &OperationId,
        table: &TableDescription,
    ) -> Result<Vec<OperationTablePart>, StorageError>;

    /// Opens a row stream covering exactly the given part.
    async fn read_rows(&self, part: &OperationTablePart) -> Result<RowStream, StorageError>;
}
