use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A settable gauge handle. Cheap to clone; all clones share the value.
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

/// Where components register their gauges. Injected so tests can assert on
/// published values without capturing global state; the transport behind a
/// production registry (push or pull) is not this crate's concern.
pub trait MetricsRegistry: Send + Sync {
    /// Returns the gauge registered under `name` with the given tag set,
    /// registering it on first use.
    fn gauge(&self, name: &str, tags: &[(&str, &str)]) -> Gauge;
}

/// In-process registry used by tests and single-node deployments.
#[derive(Default)]
pub struct MemoryRegistry {
    gauges: Mutex<HashMap<String, Gauge>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauge_value(&self, name: &str, tags: &[(&str, &str)]) -> Option<f64> {
        let gauges = self.gauges.lock().unwrap();
        gauges.get(&series_key(name, tags)).map(Gauge::get)
    }

    /// Number of registered series for a metric name, across all tag sets.
    pub fn series_count(&self, name: &str) -> usize {
        let prefix = format!("{name}{{");
        let gauges = self.gauges.lock().unwrap();
        gauges
            .keys()
            .filter(|key| *key == name || key.starts_with(&prefix))
            .count()
    }
}

impl MetricsRegistry for MemoryRegistry {
    fn gauge(&self, name: &str, tags: &[(&str, &str)]) -> Gauge {
        let mut gauges = self.gauges.lock().unwrap();
        gauges.entry(series_key(name, tags)).or_default().clone()
    }
}

fn series_key(name: &str, tags: &[(&str, &str)]) -> String {
    if tags.is_empty() {
        return name.to_string();
    }
    let mut tags: Vec<_> = tags.to_vec();
    tags.sort();
    let rendered: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}{{{}}}", rendered.join(","))
}
