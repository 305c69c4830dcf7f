use async_trait::async_trait;
use engine_core::connectors::sink::{Sink, SinkError};
use model::records::batch::RowBatch;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Sink appending row batches to one `schema.table.csv` file per table.
/// Pushes are serialized so interleaved batches from concurrent parts never
/// tear a file.
pub struct CsvDirectorySink {
    directory: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvDirectorySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Sink for CsvDirectorySink {
    async fn push(&self, batch: RowBatch) -> Result<(), SinkError> {
        let path = self.directory.join(format!("{}.csv", batch.fqtn));

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| SinkError::Write {
                fqtn: batch.fqtn.clone(),
                reason: err.to_string(),
            })?;
        file.write_all(&batch.payload)
            .await
            .map_err(|err| SinkError::Write {
                fqtn: batch.fqtn.clone(),
                reason: err.to_string(),
            })?;
        file.flush().await.map_err(|err| SinkError::Write {
            fqtn: batch.fqtn.clone(),
            reason: err.to_string(),
        })?;

        debug!(fqtn = %batch.fqtn, rows = batch.row_count, "pushed batch");
        Ok(())
    }
}
