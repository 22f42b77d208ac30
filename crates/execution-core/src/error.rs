use thiserror::Error;

/// Normalized failure of one exchange call.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// The venue answered with a non-zero return code.
    #[error("exchange rejected request: {code} - {message}")]
    Rejected { code: i64, message: String },

    /// Trading stop requested on a symbol with no open position.
    #[error("no open position")]
    NoPosition,

    #[error("authentication failed: {0}")]
    Auth(String),

    /// Timeout, connection failure, rate limit or 5xx.
    #[error("transient network error: {0}")]
    Transient(String),

    #[error("malformed exchange response: {0}")]
    Decode(String),
}

impl ExchangeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Transient(_))
    }
}
