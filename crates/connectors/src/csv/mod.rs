pub mod sink;
pub mod source;

pub use sink::CsvDirectorySink;
pub use source::CsvDirectoryStorage;
