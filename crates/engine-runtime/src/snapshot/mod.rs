use model::table::OperationTablePart;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub mod loader;
pub mod metrics;
pub mod progress;

pub use loader::{SnapshotLoader, TableProcessingPlan};
pub use metrics::{EtaParams, SnapshotTableMetricsTracker, MAX_TABLE_STAT_COUNT};
pub use progress::SnapshotTableProgressTracker;

/// The parts mapping shared between the progress tracker (writer) and the
/// metrics tracker (reader) in non-sharded mode, keyed by part identity key.
///
/// The two trackers must serialize on the same lock instance, which is why
/// the caller creates this and passes it to both constructors.
pub type SharedTableParts = Arc<Mutex<HashMap<String, OperationTablePart>>>;

pub fn new_shared_table_parts() -> SharedTableParts {
    Arc::new(Mutex::new(HashMap::new()))
}
