use crate::core::identifiers::OperationId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A table discovered on the source, with the source's row-count estimate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescription {
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub eta_rows: u64,
}

impl TableDescription {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, eta_rows: u64) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            eta_rows,
        }
    }

    pub fn fqtn(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// One unit of snapshot work: a whole table, or one shard of it.
///
/// The identity key is deterministic over (operation, FQTN, shard) so that
/// repeated updates for the same part are idempotent upserts wherever parts
/// are stored, never duplicates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationTablePart {
    pub operation_id: OperationId,
    pub schema: String,
    pub name: String,
    /// Shard discriminator within the table; `None` for an unsharded table.
    pub shard: Option<String>,
    pub eta_rows: u64,
    pub completed_rows: u64,
    pub completed: bool,
}

impl OperationTablePart {
    pub fn whole_table(operation_id: OperationId, table: &TableDescription) -> Self {
        Self {
            operation_id,
            schema: table.schema.clone(),
            name: table.name.clone(),
            shard: None,
            eta_rows: table.eta_rows,
            completed_rows: 0,
            completed: false,
        }
    }

    pub fn shard_of(
        operation_id: OperationId,
        table: &TableDescription,
        shard: impl Into<String>,
        eta_rows: u64,
    ) -> Self {
        Self {
            operation_id,
            schema: table.schema.clone(),
            name: table.name.clone(),
            shard: Some(shard.into()),
            eta_rows,
            completed_rows: 0,
            completed: false,
        }
    }

    pub fn table_fqtn(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Stable identity key for upserts and cross-shard merging.
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.operation_id,
            self.table_fqtn(),
            self.shard.as_deref().unwrap_or("-"),
        )
    }
}

impl fmt::Display for OperationTablePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shard {
            Some(shard) => write!(f, "{} (shard {})", self.table_fqtn(), shard),
            None => f.write_str(&self.table_fqtn()),
        }
    }
}
