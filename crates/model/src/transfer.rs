use crate::core::identifiers::{OperationId, TransferId};
use crate::endpoint::Source;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Snapshot,
    SnapshotAndIncrement,
    Increment,
}

impl TransferKind {
    pub fn includes_snapshot(self) -> bool {
        !matches!(self, TransferKind::Increment)
    }
}

/// Inclusion directives narrowing a transfer to a subset of the source's
/// declared objects. When present and non-empty, the directive list replaces
/// the source's declared table list entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObjects {
    #[serde(default)]
    pub include_objects: Vec<String>,
}

/// A configured source-to-target data movement job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    #[serde(default)]
    pub title: String,
    pub kind: TransferKind,
    pub src: Source,
    #[serde(default)]
    pub data_objects: Option<DataObjects>,
    /// Routed through an intermediate transfer rather than straight to the
    /// target.
    #[serde(default)]
    pub transitional: bool,
    #[serde(default)]
    pub async_operations: bool,
    #[serde(default = "default_parallelism")]
    pub snapshot_parallelism: usize,
}

fn default_parallelism() -> usize {
    4
}

impl Transfer {
    pub fn is_transitional(&self) -> bool {
        self.transitional
    }

    /// The effective include scope: directives when present and non-empty,
    /// the source's declared table list otherwise.
    pub fn include_scope(&self) -> &[String] {
        match &self.data_objects {
            Some(objects) if !objects.include_objects.is_empty() => &objects.include_objects,
            _ => self.src.include_tables(),
        }
    }
}

/// One execution of a transfer. The status string is free-form and owned by
/// whoever runs the operation; the coordinator only stores it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferOperation {
    pub operation_id: OperationId,
    pub transfer_id: TransferId,
    #[serde(default)]
    pub status: String,
}

impl TransferOperation {
    pub fn new(operation_id: impl Into<OperationId>, transfer_id: impl Into<TransferId>) -> Self {
        Self {
            operation_id: operation_id.into(),
            transfer_id: transfer_id.into(),
            status: String::new(),
        }
    }
}
