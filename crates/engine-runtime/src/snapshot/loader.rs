use crate::error::TaskError;
use crate::snapshot::metrics::{EtaParams, SnapshotTableMetricsTracker};
use crate::snapshot::new_shared_table_parts;
use crate::snapshot::progress::SnapshotTableProgressTracker;
use coordinator::Coordinator;
use engine_core::connectors::sink::Sink;
use engine_core::connectors::source::SnapshotStorage;
use engine_core::metrics::MetricsRegistry;
use futures::TryStreamExt;
use model::core::identifiers::OperationId;
use model::object_ref::ObjectRef;
use model::table::{OperationTablePart, TableDescription};
use model::transfer::Transfer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const OPERATION_STATE_RUNNING: &str = "Running";
pub const OPERATION_STATE_COMPLETED: &str = "Completed";

/// The ordered set of table parts one snapshot will copy, with the summed
/// row estimate. Building it is deterministic given the same table list and
/// the same partitioning hints from the storage.
#[derive(Debug, Default)]
pub struct TableProcessingPlan {
    pub parts: Vec<OperationTablePart>,
    pub total_eta_rows: u64,
}

/// Turns a transfer with a declared or include-filtered table list into a
/// durably tracked, resumable bulk copy.
pub struct SnapshotLoader {
    coordinator: Arc<dyn Coordinator>,
    operation_id: OperationId,
    transfer: Transfer,
    registry: Arc<dyn MetricsRegistry>,
}

impl SnapshotLoader {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        operation_id: OperationId,
        transfer: Transfer,
        registry: Arc<dyn MetricsRegistry>,
    ) -> Self {
        Self {
            coordinator,
            operation_id,
            transfer,
            registry,
        }
    }

    /// Validates the transfer's include scope against the discovered table
    /// list. Entries may be exact `schema.table` references or `schema.*`
    /// wildcards, in any quoting permutation; matching is case-sensitive
    /// and quote-insensitive. Every entry that matches nothing is reported
    /// verbatim, in declaration order.
    pub fn check_include_directives(&self, tables: &[TableDescription]) -> Result<(), TaskError> {
        let mut missing = Vec::new();
        for raw in self.transfer.include_scope() {
            let matched = ObjectRef::parse(raw)
                .map(|parsed| {
                    tables
                        .iter()
                        .any(|table| parsed.matches(&table.schema, &table.name))
                })
                .unwrap_or(false);
            if !matched {
                missing.push(raw.clone());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TaskError::MissingIncludeTables { missing })
        }
    }

    /// Narrows discovered tables to the transfer's include scope. An empty
    /// scope selects everything.
    fn tables_in_scope(&self, tables: Vec<TableDescription>) -> Vec<TableDescription> {
        let scope: Vec<ObjectRef> = self
            .transfer
            .include_scope()
            .iter()
            .filter_map(|raw| ObjectRef::parse(raw))
            .collect();
        if scope.is_empty() {
            return tables;
        }
        tables
            .into_iter()
            .filter(|table| {
                scope
                    .iter()
                    .any(|parsed| parsed.matches(&table.schema, &table.name))
            })
            .collect()
    }

    /// Builds the table processing plan by asking the storage to partition
    /// each discovered table. An already-canceled token yields an empty
    /// plan, and cancellation observed mid-build stops planning early; both
    /// are clean no-op results, not errors.
    pub async fn build_tpp(
        &self,
        cancel: &CancellationToken,
        storage: &dyn SnapshotStorage,
        tables: &[TableDescription],
    ) -> Result<TableProcessingPlan, TaskError> {
        let mut plan = TableProcessingPlan::default();
        for table in tables {
            if cancel.is_cancelled() {
                return Ok(plan);
            }
            let mut parts = storage.shard_table(&self.operation_id, table).await?;
            if parts.is_empty() {
                parts.push(OperationTablePart::whole_table(
                    self.operation_id.clone(),
                    table,
                ));
            }
            for part in &parts {
                plan.total_eta_rows += part.eta_rows;
            }
            plan.parts.extend(parts);
        }
        Ok(plan)
    }

    /// Copies every part of the plan through the storage/sink pair, feeding
    /// progress into a progress tracker and remaining-rows telemetry into a
    /// metrics tracker, both owned for the duration of the upload.
    ///
    /// Cancellation unwinds in-flight work and returns `Ok`; a storage or
    /// sink failure is fatal and propagated after both trackers have
    /// drained and flushed.
    pub async fn do_upload_tables(
        &self,
        cancel: &CancellationToken,
        storage: Arc<dyn SnapshotStorage>,
        sink: Arc<dyn Sink>,
        plan: TableProcessingPlan,
    ) -> Result<(), TaskError> {
        let shared_parts = new_shared_table_parts();
        let progress = SnapshotTableProgressTracker::new(
            self.coordinator.clone(),
            self.operation_id.clone(),
            shared_parts.clone(),
        );
        for part in &plan.parts {
            progress.add(part);
        }
        let metrics = SnapshotTableMetricsTracker::new_local(
            self.registry.clone(),
            shared_parts.clone(),
            Some(EtaParams::from_parts(plan.parts.iter())),
        )
        .await;

        let parallelism = self.transfer.snapshot_parallelism.max(1);
        let result = futures::stream::iter(plan.parts.into_iter().map(Ok::<_, TaskError>))
            .try_for_each_concurrent(parallelism, |part| {
                let storage = storage.clone();
                let sink = sink.clone();
                let progress = &progress;
                async move { upload_part(storage.as_ref(), sink.as_ref(), progress, cancel, part).await }
            })
            .await;

        progress.close().await;
        metrics.close().await;
        result
    }

    /// The whole snapshot: discover, validate, plan, upload, record
    /// operation state transitions.
    pub async fn load_snapshot(
        &self,
        cancel: &CancellationToken,
        storage: Arc<dyn SnapshotStorage>,
        sink: Arc<dyn Sink>,
    ) -> Result<(), TaskError> {
        let tables = storage.table_list().await?;
        self.check_include_directives(&tables)?;
        let tables = self.tables_in_scope(tables);

        self.coordinator
            .set_operation_state(&self.operation_id, OPERATION_STATE_RUNNING)
            .await?;

        let plan = self.build_tpp(cancel, storage.as_ref(), &tables).await?;
        info!(
            operation_id = %self.operation_id,
            parts = plan.parts.len(),
            eta_rows = plan.total_eta_rows,
            "table processing plan built",
        );

        self.do_upload_tables(cancel, storage, sink, plan).await?;

        if cancel.is_cancelled() {
            info!(operation_id = %self.operation_id, "snapshot canceled, unwound cleanly");
            return Ok(());
        }

        self.coordinator
            .set_operation_state(&self.operation_id, OPERATION_STATE_COMPLETED)
            .await?;
        info!(operation_id = %self.operation_id, "snapshot completed");
        Ok(())
    }
}

async fn upload_part(
    storage: &dyn SnapshotStorage,
    sink: &dyn Sink,
    progress: &SnapshotTableProgressTracker,
    cancel: &CancellationToken,
    mut part: OperationTablePart,
) -> Result<(), TaskError> {
    if cancel.is_cancelled() {
        return Ok(());
    }
    debug!(part = %part, eta_rows = part.eta_rows, "uploading table part");

    let mut rows = storage.read_rows(&part).await?;
    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            batch = rows.try_next() => batch?,
        };
        let Some(batch) = batch else { break };
        let row_count = batch.row_count;
        sink.push(batch).await?;
        part.completed_rows += row_count;
        progress.add(&part);
    }

    part.completed = true;
    progress.add(&part);
    info!(part = %part, rows = part.completed_rows, "table part uploaded");
    Ok(())
}
