use crate::snapshot::SharedTableParts;
use coordinator::Coordinator;
use engine_core::flusher::PeriodicFlusher;
use futures::FutureExt;
use model::core::identifiers::OperationId;
use model::table::OperationTablePart;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const PUSH_INTERVAL: Duration = Duration::from_secs(60);

struct ProgressInner {
    coordinator: Arc<dyn Coordinator>,
    operation_id: OperationId,
    parts: SharedTableParts,
}

impl ProgressInner {
    async fn flush(&self) {
        let parts_copy: Vec<OperationTablePart> = {
            let parts = self.parts.lock().unwrap();
            parts.values().cloned().collect()
        };
        if parts_copy.is_empty() {
            return;
        }

        if let Err(err) = self
            .coordinator
            .update_operation_tables_parts(&self.operation_id, &parts_copy)
            .await
        {
            // The in-memory copy is untouched; next tick retries.
            warn!(
                operation_id = %self.operation_id,
                error = %err,
                "failed to push tables progress, will retry",
            );
            return;
        }

        // Durably flushed completed parts no longer need buffering. Recheck
        // under the lock: only drop entries still marked completed.
        let mut parts = self.parts.lock().unwrap();
        for pushed in parts_copy.iter().filter(|part| part.completed) {
            let key = pushed.key();
            if parts.get(&key).is_some_and(|current| current.completed) {
                parts.remove(&key);
            }
        }
    }
}

/// Buffers per-part progress in memory and periodically publishes a durable
/// snapshot through the coordinator, off the upload hot path.
pub struct SnapshotTableProgressTracker {
    inner: Arc<ProgressInner>,
    flusher: PeriodicFlusher,
}

impl SnapshotTableProgressTracker {
    /// `parts` is the mapping shared with a non-sharded metrics tracker;
    /// both trackers must receive the same instance.
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        operation_id: OperationId,
        parts: SharedTableParts,
    ) -> Self {
        let inner = Arc::new(ProgressInner {
            coordinator,
            operation_id,
            parts,
        });
        let action_inner = inner.clone();
        let flusher = PeriodicFlusher::spawn(
            PUSH_INTERVAL,
            Arc::new(move || {
                let inner = action_inner.clone();
                async move { inner.flush().await }.boxed()
            }),
        );
        Self { inner, flusher }
    }

    /// Upserts the part by its identity key. Constant-time, never blocks on
    /// the coordinator.
    pub fn add(&self, part: &OperationTablePart) {
        let mut parts = self.inner.parts.lock().unwrap();
        parts.insert(part.key(), part.clone());
    }

    /// One immediate flush. The background loop calls this on every tick.
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// Stops the background loop, waits for it to exit and performs one
    /// final flush. Safe to call multiple times; only the first has effect.
    pub async fn close(&self) {
        self.flusher.close().await;
    }
}
