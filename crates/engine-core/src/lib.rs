pub mod connectors;
pub mod flusher;
pub mod metrics;
