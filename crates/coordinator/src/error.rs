use model::core::identifiers::{OperationId, TransferId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// The operation's state was queried before ever being set. Distinct
    /// from "found but empty" so callers can pick default-vs-fail semantics.
    #[error("operation state not found for operation `{0}`")]
    OperationStateNotFound(OperationId),

    #[error("no endpoint stored for transfer `{0}`")]
    EndpointNotFound(TransferId),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("failed to encode or decode stored value: {0}")]
    Codec(String),
}

impl From<sled::Error> for CoordinatorError {
    fn from(err: sled::Error) -> Self {
        CoordinatorError::Storage(err.to_string())
    }
}
