use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    /// The operation does not apply to the record in its current state.
    #[error("invalid operation on {id}: {reason}")]
    Invalid { id: String, reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("decode error: {0}")]
    Decode(String),
}
