use coordinator::CoordinatorError;
use engine_core::connectors::source::StorageError;
use engine_runtime::error::TaskError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid transfer config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("this build only drives csv sources, config declares `{0}`")]
    UnsupportedSource(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
