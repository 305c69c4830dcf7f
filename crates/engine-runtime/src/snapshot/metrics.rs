use crate::snapshot::SharedTableParts;
use coordinator::Coordinator;
use engine_core::flusher::PeriodicFlusher;
use engine_core::metrics::{Gauge, MetricsRegistry};
use futures::FutureExt;
use model::core::identifiers::OperationId;
use model::table::OperationTablePart;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Cap on distinct per-table telemetry keys. Past the cap, additional
/// tables are dropped from per-table gauges; the total gauge still covers
/// every table.
pub const MAX_TABLE_STAT_COUNT: usize = 1000;

const PUSH_INTERVAL: Duration = Duration::from_secs(15);

pub const TOTAL_REMAINDER_GAUGE: &str = "task.snapshot.reminder.total";
pub const TABLE_REMAINDER_GAUGE: &str = "task.snapshot.remainder.table";

/// An immutable ETA baseline: total estimated rows and per-table estimates,
/// capped at [`MAX_TABLE_STAT_COUNT`] distinct tables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EtaParams {
    pub total_eta: f64,
    pub tables_etas: HashMap<String, f64>,
}

impl EtaParams {
    pub fn from_parts<'a>(parts: impl IntoIterator<Item = &'a OperationTablePart>) -> Self {
        let mut params = EtaParams::default();
        for part in parts {
            params.total_eta += part.eta_rows as f64;
            let table_key = part.table_fqtn();
            if let Some(eta) = params.tables_etas.get_mut(&table_key) {
                *eta += part.eta_rows as f64;
            } else if params.tables_etas.len() < MAX_TABLE_STAT_COUNT {
                params.tables_etas.insert(table_key, part.eta_rows as f64);
            }
        }
        params
    }

    fn capped(mut self) -> Self {
        if self.tables_etas.len() > MAX_TABLE_STAT_COUNT {
            self.tables_etas = self
                .tables_etas
                .into_iter()
                .take(MAX_TABLE_STAT_COUNT)
                .collect();
        }
        self
    }
}

enum PartsSource {
    /// Non-sharded: the mapping the progress tracker writes, behind the
    /// shared lock.
    Local(SharedTableParts),
    /// Sharded: the coordinator merges every worker's reports.
    Sharded {
        coordinator: Arc<dyn Coordinator>,
        operation_id: OperationId,
    },
}

impl PartsSource {
    /// `None` means this tick could not read parts and should be skipped.
    async fn parts(&self) -> Option<Vec<OperationTablePart>> {
        match self {
            PartsSource::Local(shared) => {
                let parts = shared.lock().unwrap();
                Some(parts.values().cloned().collect())
            }
            PartsSource::Sharded {
                coordinator,
                operation_id,
            } => match coordinator.get_operation_tables_parts(operation_id).await {
                Ok(parts) => Some(parts),
                Err(err) => {
                    error!(
                        operation_id = %operation_id,
                        error = %err,
                        "failed to get tables parts for metrics update",
                    );
                    None
                }
            },
        }
    }
}

struct MetricsInner {
    source: PartsSource,
    total_eta: f64,
    tables_etas: HashMap<String, f64>,
    total_gauge: Gauge,
    table_gauges: HashMap<String, Gauge>,
}

impl MetricsInner {
    async fn publish(&self) {
        let Some(parts) = self.source.parts().await else {
            return;
        };
        if parts.is_empty() {
            return;
        }

        let mut total_completed = 0f64;
        let mut tables_completed: HashMap<String, f64> = HashMap::new();
        for part in &parts {
            total_completed += part.completed_rows as f64;
            let table_key = part.table_fqtn();
            if self.tables_etas.contains_key(&table_key) {
                *tables_completed.entry(table_key).or_default() += part.completed_rows as f64;
            }
        }

        self.total_gauge.set(self.total_eta - total_completed);

        for (table_key, gauge) in &self.table_gauges {
            if let Some(eta) = self.tables_etas.get(table_key)
                && let Some(completed) = tables_completed.get(table_key)
            {
                gauge.set(eta - completed);
            }
        }
    }
}

/// Publishes remaining-rows gauges (one per table plus a total), either from
/// the locally shared parts mapping or, for sharded transfers, from the
/// coordinator's merged view.
pub struct SnapshotTableMetricsTracker {
    inner: Arc<MetricsInner>,
    flusher: PeriodicFlusher,
}

impl SnapshotTableMetricsTracker {
    /// Non-sharded mode. `parts` must be the same instance the progress
    /// tracker writes.
    pub async fn new_local(
        registry: Arc<dyn MetricsRegistry>,
        parts: SharedTableParts,
        init: Option<EtaParams>,
    ) -> Self {
        Self::start(registry, PartsSource::Local(parts), init).await
    }

    /// Sharded mode: parts are read through the coordinator so progress from
    /// every worker process lands in one ETA view.
    pub async fn new_sharded(
        registry: Arc<dyn MetricsRegistry>,
        coordinator: Arc<dyn Coordinator>,
        operation_id: OperationId,
        init: Option<EtaParams>,
    ) -> Self {
        Self::start(
            registry,
            PartsSource::Sharded {
                coordinator,
                operation_id,
            },
            init,
        )
        .await
    }

    async fn start(
        registry: Arc<dyn MetricsRegistry>,
        source: PartsSource,
        init: Option<EtaParams>,
    ) -> Self {
        let eta = match init {
            Some(params) => params.capped(),
            None => EtaParams::from_parts(source.parts().await.unwrap_or_default().iter()),
        };

        let total_gauge = registry.gauge(TOTAL_REMAINDER_GAUGE, &[]);
        total_gauge.set(eta.total_eta);

        let mut table_gauges = HashMap::new();
        for (table_key, table_eta) in &eta.tables_etas {
            let gauge = registry.gauge(TABLE_REMAINDER_GAUGE, &[("table", table_key)]);
            gauge.set(*table_eta);
            table_gauges.insert(table_key.clone(), gauge);
        }

        let inner = Arc::new(MetricsInner {
            source,
            total_eta: eta.total_eta,
            tables_etas: eta.tables_etas,
            total_gauge,
            table_gauges,
        });
        let action_inner = inner.clone();
        let flusher = PeriodicFlusher::spawn(
            PUSH_INTERVAL,
            Arc::new(move || {
                let inner = action_inner.clone();
                async move { inner.publish().await }.boxed()
            }),
        );
        Self { inner, flusher }
    }

    /// One immediate gauge update. The background loop calls this on every
    /// tick.
    pub async fn publish(&self) {
        self.inner.publish().await;
    }

    /// Stops the background loop, waits for it to exit and publishes once
    /// more. Safe to call multiple times; only the first has effect.
    pub async fn close(&self) {
        self.flusher.close().await;
    }
}
