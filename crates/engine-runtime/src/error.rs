use crate::job::{JobError, SchemaError};
use coordinator::CoordinatorError;
use engine_core::connectors::sink::SinkError;
use engine_core::connectors::source::StorageError;
use model::endpoint::EndpointError;
use thiserror::Error;

/// Errors surfaced by the tasks layer (snapshot loading, add-tables).
///
/// Transient coordination failures inside the background trackers are not
/// here on purpose: they are logged and retried on the next tick, never
/// propagated (see the progress and metrics trackers).
#[derive(Error, Debug)]
pub enum TaskError {
    /// The operation is not supported for this source kind or transfer
    /// topology. Never retried.
    #[error("{0}")]
    Unsupported(String),

    /// Include directives referencing tables the source does not have. The
    /// entries are verbatim, in declaration order.
    #[error("some tables from include list are missing in the source database: [{}]", .missing.join(" "))]
    MissingIncludeTables { missing: Vec<String> },

    /// Structurally invalid candidate table names.
    #[error("invalid tables names: {0}")]
    InvalidTables(#[from] EndpointError),

    /// Candidate tables that do not exist on the live source.
    #[error("source database has no desired tables: [{}]", .missing.join(" "))]
    MissingCandidateTables { missing: Vec<String> },

    #[error("coordinator: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Fatal data-path failure on the source side; aborts the load.
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// Fatal data-path failure on the target side; aborts the load.
    #[error("sink: {0}")]
    Sink(#[from] SinkError),

    #[error("job control: {0}")]
    Job(#[from] JobError),

    #[error("schema replication: {0}")]
    Schema(#[from] SchemaError),
}
