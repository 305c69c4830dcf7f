use bytes::Bytes;

/// A batch of rows read from one table part, on its way to the sink.
///
/// The payload encoding is a contract between the storage and the sink; the
/// engine core only accounts rows.
#[derive(Debug, Clone)]
pub struct RowBatch {
    pub fqtn: String,
    pub row_count: u64,
    pub payload: Bytes,
}

impl RowBatch {
    pub fn new(fqtn: impl Into<String>, row_count: u64, payload: Bytes) -> Self {
        Self {
            fqtn: fqtn.into(),
            row_count,
            payload,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }
}
