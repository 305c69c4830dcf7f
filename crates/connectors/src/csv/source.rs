use async_trait::async_trait;
use bytes::Bytes;
use engine_core::connectors::source::{RowStream, SnapshotStorage, StorageError};
use model::core::identifiers::OperationId;
use model::endpoint::CsvSource;
use model::object_ref::ObjectRef;
use model::records::batch::RowBatch;
use model::table::{OperationTablePart, TableDescription};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_BATCH_ROWS: usize = 1000;

/// Snapshot storage over a directory of `schema.table.csv` files. Each file
/// is one table; the first record is the header.
pub struct CsvDirectoryStorage {
    directory: PathBuf,
    include: Vec<ObjectRef>,
    batch_rows: usize,
}

impl CsvDirectoryStorage {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            include: Vec::new(),
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }

    /// Builds the storage from its endpoint record, narrowing discovery to
    /// the configured include scope when one is declared.
    pub fn from_source(source: &CsvSource) -> Self {
        let include = source
            .include_tables
            .iter()
            .filter_map(|raw| ObjectRef::parse(raw))
            .collect();
        Self {
            include,
            ..Self::new(source.directory.clone())
        }
    }

    pub fn with_batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = batch_rows.max(1);
        self
    }

    fn in_scope(&self, schema: &str, name: &str) -> bool {
        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|parsed| parsed.matches(schema, name))
    }

    fn table_path(&self, fqtn: &str) -> PathBuf {
        self.directory.join(format!("{fqtn}.csv"))
    }
}

/// `schema.table` from a `schema.table.csv` file name.
fn parse_file_name(path: &Path) -> Option<(String, String)> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(".csv")?;
    let parsed = ObjectRef::parse(stem)?;
    if parsed.is_wildcard() {
        return None;
    }
    Some((parsed.schema, parsed.table))
}

fn count_data_rows(path: &Path) -> Result<u64, StorageError> {
    let mut reader = csv::Reader::from_path(path).map_err(|err| StorageError::Discovery(err.to_string()))?;
    let mut rows = 0u64;
    for record in reader.records() {
        record.map_err(|err| StorageError::Discovery(err.to_string()))?;
        rows += 1;
    }
    Ok(rows)
}

fn read_batches(
    path: &Path,
    fqtn: &str,
    batch_rows: usize,
) -> Result<Vec<RowBatch>, StorageError> {
    let map_err = |err: csv::Error| StorageError::Read {
        part: fqtn.to_string(),
        reason: err.to_string(),
    };

    let mut reader = csv::Reader::from_path(path).map_err(map_err)?;
    let mut batches = Vec::new();
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut pending = 0usize;

    for record in reader.records() {
        writer.write_record(&record.map_err(map_err)?).map_err(map_err)?;
        pending += 1;
        if pending == batch_rows {
            let payload = writer.into_inner().map_err(|err| StorageError::Read {
                part: fqtn.to_string(),
                reason: err.to_string(),
            })?;
            batches.push(RowBatch::new(fqtn, pending as u64, Bytes::from(payload)));
            writer = csv::Writer::from_writer(Vec::new());
            pending = 0;
        }
    }
    if pending > 0 {
        let payload = writer.into_inner().map_err(|err| StorageError::Read {
            part: fqtn.to_string(),
            reason: err.to_string(),
        })?;
        batches.push(RowBatch::new(fqtn, pending as u64, Bytes::from(payload)));
    }
    Ok(batches)
}

#[async_trait]
impl SnapshotStorage for CsvDirectoryStorage {
    async fn table_list(&self) -> Result<Vec<TableDescription>, StorageError> {
        let directory = self.directory.clone();
        let mut tables = Vec::new();

        let mut entries = tokio::fs::read_dir(&directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some((schema, name)) = parse_file_name(&path) else {
                continue;
            };
            if !self.in_scope(&schema, &name) {
                continue;
            }
            let eta_rows =
                tokio::task::spawn_blocking(move || count_data_rows(&path))
                    .await
                    .map_err(|err| StorageError::Discovery(err.to_string()))??;
            tables.push(TableDescription::new(schema, name, eta_rows));
        }

        tables.sort_by(|a, b| a.fqtn().cmp(&b.fqtn()));
        debug!(directory = %directory.display(), tables = tables.len(), "discovered csv tables");
        Ok(tables)
    }

    async fn shard_table(
        &self,
        operation_id: &OperationId,
        table: &TableDescription,
    ) -> Result<Vec<OperationTablePart>, StorageError> {
        // A csv file reads sequentially; no useful sharding hints.
        Ok(vec![OperationTablePart::whole_table(
            operation_id.clone(),
            table,
        )])
    }

    async fn read_rows(&self, part: &OperationTablePart) -> Result<RowStream, StorageError> {
        let path = self.table_path(&part.table_fqtn());
        let fqtn = part.table_fqtn();
        let batch_rows = self.batch_rows;

        let batches =
            tokio::task::spawn_blocking(move || read_batches(&path, &fqtn, batch_rows))
                .await
                .map_err(|err| StorageError::Read {
                    part: part.to_string(),
                    reason: err.to_string(),
                })??;

        Ok(Box::pin(futures::stream::iter(batches.into_iter().map(Ok))))
    }
}
