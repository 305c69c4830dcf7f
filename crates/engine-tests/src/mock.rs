use async_trait::async_trait;
use bytes::Bytes;
use coordinator::{Coordinator, CoordinatorError, InMemoryCoordinator, TransferStateData};
use engine_core::connectors::sink::{Sink, SinkError};
use engine_core::connectors::source::{RowStream, SnapshotStorage, StorageError};
use engine_runtime::job::{JobControl, JobError, SchemaApplier, SchemaError};
use model::core::identifiers::{OperationId, TransferId};
use model::endpoint::Source;
use model::records::batch::RowBatch;
use model::table::{OperationTablePart, TableDescription};
use model::transfer::{Transfer, TransferOperation};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Storage serving a fixed table list, with a configurable number of shards
/// per table and batches per part.
pub struct MockStorage {
    tables: Vec<TableDescription>,
    shards_per_table: usize,
    batches_per_part: usize,
    rows_per_batch: u64,
    fail_reads: bool,
}

impl MockStorage {
    pub fn new(tables: Vec<TableDescription>) -> Self {
        Self {
            tables,
            shards_per_table: 1,
            batches_per_part: 1,
            rows_per_batch: 10,
            fail_reads: false,
        }
    }

    pub fn with_shards(mut self, shards_per_table: usize) -> Self {
        self.shards_per_table = shards_per_table;
        self
    }

    pub fn with_batches(mut self, batches_per_part: usize, rows_per_batch: u64) -> Self {
        self.batches_per_part = batches_per_part;
        self.rows_per_batch = rows_per_batch;
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }
}

#[async_trait]
impl SnapshotStorage for MockStorage {
    async fn table_list(&self) -> Result<Vec<TableDescription>, StorageError> {
        Ok(self.tables.clone())
    }

    async fn shard_table(
        &self,
        operation_id: &OperationId,
        table: &TableDescription,
    ) -> Result<Vec<OperationTablePart>, StorageError> {
        if self.shards_per_table <= 1 {
            return Ok(vec![OperationTablePart::whole_table(
                operation_id.clone(),
                table,
            )]);
        }
        let eta = table.eta_rows / self.shards_per_table as u64;
        Ok((0..self.shards_per_table)
            .map(|i| OperationTablePart::shard_of(operation_id.clone(), table, i.to_string(), eta))
            .collect())
    }

    async fn read_rows(&self, part: &OperationTablePart) -> Result<RowStream, StorageError> {
        if self.fail_reads {
            return Err(StorageError::Read {
                part: part.to_string(),
                reason: "mock read failure".into(),
            });
        }
        let fqtn = part.table_fqtn();
        let rows = self.rows_per_batch;
        let batches: Vec<Result<RowBatch, StorageError>> = (0..self.batches_per_part)
            .map(|_| Ok(RowBatch::new(fqtn.clone(), rows, Bytes::new())))
            .collect();
        Ok(Box::pin(futures::stream::iter(batches)))
    }
}

/// Sink counting everything pushed into it, optionally failing every push.
#[derive(Default)]
pub struct RecordingSink {
    fail: bool,
    rows: Mutex<HashMap<String, u64>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            rows: Mutex::new(HashMap::new()),
        }
    }

    pub fn rows_for(&self, fqtn: &str) -> u64 {
        self.rows.lock().unwrap().get(fqtn).copied().unwrap_or(0)
    }

    pub fn total_rows(&self) -> u64 {
        self.rows.lock().unwrap().values().sum()
    }

    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.rows.lock().unwrap().keys().cloned().collect();
        tables.sort();
        tables
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn push(&self, batch: RowBatch) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Write {
                fqtn: batch.fqtn.clone(),
                reason: "mock write failure".into(),
            });
        }
        *self.rows.lock().unwrap().entry(batch.fqtn).or_default() += batch.row_count;
        Ok(())
    }
}

/// In-memory coordinator whose part updates can be made to fail, with a call
/// counter, for exercising the trackers' retry-next-tick behavior.
pub struct FlakyCoordinator {
    inner: InMemoryCoordinator,
    fail_part_updates: AtomicBool,
    part_update_calls: AtomicUsize,
}

impl FlakyCoordinator {
    pub fn new() -> Self {
        Self {
            inner: InMemoryCoordinator::new(),
            fail_part_updates: AtomicBool::new(false),
            part_update_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_part_updates(&self, fail: bool) {
        self.fail_part_updates.store(fail, Ordering::SeqCst);
    }

    pub fn part_update_calls(&self) -> usize {
        self.part_update_calls.load(Ordering::SeqCst)
    }
}

impl Default for FlakyCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Coordinator for FlakyCoordinator {
    async fn set_operation_state(
        &self,
        operation_id: &OperationId,
        state: &str,
    ) -> Result<(), CoordinatorError> {
        self.inner.set_operation_state(operation_id, state).await
    }

    async fn get_operation_state(
        &self,
        operation_id: &OperationId,
    ) -> Result<String, CoordinatorError> {
        self.inner.get_operation_state(operation_id).await
    }

    async fn get_transfer_state(
        &self,
        transfer_id: &TransferId,
    ) -> Result<HashMap<String, TransferStateData>, CoordinatorError> {
        self.inner.get_transfer_state(transfer_id).await
    }

    async fn set_transfer_state(
        &self,
        transfer_id: &TransferId,
        state: HashMap<String, TransferStateData>,
    ) -> Result<(), CoordinatorError> {
        self.inner.set_transfer_state(transfer_id, state).await
    }

    async fn remove_transfer_state(
        &self,
        transfer_id: &TransferId,
        keys: &[String],
    ) -> Result<(), CoordinatorError> {
        self.inner.remove_transfer_state(transfer_id, keys).await
    }

    async fn update_operation_tables_parts(
        &self,
        operation_id: &OperationId,
        parts: &[OperationTablePart],
    ) -> Result<(), CoordinatorError> {
        self.part_update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_part_updates.load(Ordering::SeqCst) {
            return Err(CoordinatorError::Storage("mock outage".into()));
        }
        self.inner
            .update_operation_tables_parts(operation_id, parts)
            .await
    }

    async fn get_operation_tables_parts(
        &self,
        operation_id: &OperationId,
    ) -> Result<Vec<OperationTablePart>, CoordinatorError> {
        self.inner.get_operation_tables_parts(operation_id).await
    }

    async fn get_endpoint(
        &self,
        transfer_id: &TransferId,
        for_update: bool,
    ) -> Result<Source, CoordinatorError> {
        self.inner.get_endpoint(transfer_id, for_update).await
    }

    async fn update_endpoint(
        &self,
        transfer_id: &TransferId,
        endpoint: Source,
    ) -> Result<(), CoordinatorError> {
        self.inner.update_endpoint(transfer_id, endpoint).await
    }
}

/// Job control that records stop/start calls.
#[derive(Default)]
pub struct RecordingJobControl {
    pub stops: AtomicUsize,
    pub starts: AtomicUsize,
}

impl RecordingJobControl {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobControl for RecordingJobControl {
    async fn stop_job(&self, _transfer: &Transfer) -> Result<(), JobError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_job(
        &self,
        _transfer: &Transfer,
        _operation: &TransferOperation,
    ) -> Result<(), JobError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Schema applier failing every call.
pub struct FailingSchemaApplier;

#[async_trait]
impl SchemaApplier for FailingSchemaApplier {
    async fn apply_schema(
        &self,
        _transfer: &Transfer,
        _tables: &[String],
    ) -> Result<(), SchemaError> {
        Err(SchemaError::Apply("mock ddl failure".into()))
    }
}
