use crate::error::TaskError;
use crate::job::{JobControl, SchemaApplier};
use crate::snapshot::SnapshotLoader;
use coordinator::Coordinator;
use engine_core::connectors::sink::Sink;
use engine_core::connectors::source::SnapshotStorage;
use engine_core::metrics::MetricsRegistry;
use model::endpoint::merge_table_lists;
use model::object_ref::ObjectRef;
use model::transfer::{Transfer, TransferOperation};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Precondition for the online table-set mutation: the source must hand out
/// the mutation capability, and the transfer must be a plain synchronous
/// topology.
pub fn check_add_tables_supported(transfer: &Transfer) -> Result<(), TaskError> {
    if !transfer.src.supports_table_set_mutation() {
        return Err(TaskError::Unsupported(
            "add tables is supported only for sources with a mutable table set".into(),
        ));
    }
    if transfer.is_transitional() || transfer.async_operations {
        return Err(TaskError::Unsupported(
            "add tables is supported only for non-transitional transfers with synchronous operations"
                .into(),
        ));
    }
    Ok(())
}

/// Extends the table set of a running transfer: stop, validate, merge,
/// replicate schema, snapshot only the new tables, persist the merged set,
/// restart.
///
/// The merged table set reaches durable storage only after the snapshot of
/// the new tables succeeded; any failure past the stop leaves the transfer
/// stopped with the old table set still persisted. Re-running after a
/// manual resume is safe: validation simply re-accepts tables that are
/// already present.
pub struct AddTables {
    coordinator: Arc<dyn Coordinator>,
    job: Arc<dyn JobControl>,
    schema: Arc<dyn SchemaApplier>,
    registry: Arc<dyn MetricsRegistry>,
}

impl AddTables {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        job: Arc<dyn JobControl>,
        schema: Arc<dyn SchemaApplier>,
        registry: Arc<dyn MetricsRegistry>,
    ) -> Self {
        Self {
            coordinator,
            job,
            schema,
            registry,
        }
    }

    pub async fn run(
        &self,
        cancel: &CancellationToken,
        mut transfer: Transfer,
        operation: TransferOperation,
        tables: Vec<String>,
        storage: Arc<dyn SnapshotStorage>,
        sink: Arc<dyn Sink>,
    ) -> Result<(), TaskError> {
        check_add_tables_supported(&transfer)?;

        self.job.stop_job(&transfer).await?;

        let Some(src) = transfer.src.table_list_mutable() else {
            return Err(TaskError::Unsupported(
                "add tables is supported only for sources with a mutable table set".into(),
            ));
        };
        src.validate_candidate_tables(&tables)?;
        let merged = merge_table_lists(&src.table_list(), &tables);
        self.verify_tables_exist(storage.as_ref(), &tables).await?;

        info!(tables = ?tables, transfer_id = %transfer.id, "initial load for added tables");

        // Scope a copy of the transfer to just the new tables: only they are
        // snapshotted. Schema pre-steps still cover the merged set.
        let mut scoped = transfer.clone();
        scoped.data_objects = None;
        if let Some(src) = scoped.src.table_list_mutable() {
            src.replace_table_list(tables.clone());
        }

        if scoped.src.pre_steps().is_some_and(|steps| steps.any_enabled()) {
            self.schema.apply_schema(&scoped, &merged).await?;
        }

        let loader = SnapshotLoader::new(
            self.coordinator.clone(),
            operation.operation_id.clone(),
            scoped,
            self.registry.clone(),
        );
        loader.load_snapshot(cancel, storage, sink).await?;

        info!(
            tables = ?tables,
            transfer_id = %transfer.id,
            "load done, storing added tables in source endpoint and restarting transfer",
        );

        let mut endpoint = self.coordinator.get_endpoint(&transfer.id, true).await?;
        match endpoint.table_list_mutable() {
            Some(src) => {
                src.replace_table_list(merged);
            }
            None => {
                return Err(TaskError::Unsupported(
                    "stored endpoint does not support table set mutation".into(),
                ));
            }
        }
        self.coordinator
            .update_endpoint(&transfer.id, endpoint)
            .await?;

        self.job.start_job(&transfer, &operation).await?;
        Ok(())
    }

    /// Confirms every requested table exists on the live source.
    async fn verify_tables_exist(
        &self,
        storage: &dyn SnapshotStorage,
        tables: &[String],
    ) -> Result<(), TaskError> {
        let discovered = storage.table_list().await?;
        let missing: Vec<String> = tables
            .iter()
            .filter(|raw| {
                !ObjectRef::parse(raw.as_str())
                    .map(|parsed| {
                        discovered
                            .iter()
                            .any(|table| parsed.matches(&table.schema, &table.name))
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TaskError::MissingCandidateTables { missing })
        }
    }
}
