pub mod add_tables;
pub mod error;
pub mod job;
pub mod snapshot;
