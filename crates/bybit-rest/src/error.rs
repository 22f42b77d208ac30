//! Bybit REST API error types.

use execution_core::ExchangeError;
use rest_client::RestError;
use thiserror::Error;

/// `retCode` for "leverage not modified".
pub(crate) const LEVERAGE_NOT_MODIFIED: i64 = 110043;
/// `retCode` for generic parameter errors, also used for "zero position".
pub(crate) const PARAMS_ERROR: i64 = 10001;

/// Errors that can occur when interacting with the Bybit REST API.
#[derive(Debug, Error)]
pub enum BybitRestError {
    #[error("REST client error: {0}")]
    Rest(#[from] RestError),

    /// Non-zero `retCode` in the response envelope.
    #[error("Bybit API error {code}: {message}")]
    ApiError { code: i64, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl BybitRestError {
    /// Check if the venue refused a trading stop because nothing is open.
    pub fn is_zero_position(&self) -> bool {
        match self {
            Self::ApiError { code, message } => {
                *code == PARAMS_ERROR && message.to_lowercase().contains("zero position")
            }
            _ => false,
        }
    }

    pub fn is_leverage_not_modified(&self) -> bool {
        matches!(self, Self::ApiError { code, .. } if *code == LEVERAGE_NOT_MODIFIED)
    }
}

impl From<BybitRestError> for ExchangeError {
    fn from(err: BybitRestError) -> Self {
        if err.is_zero_position() {
            return ExchangeError::NoPosition;
        }
        match err {
            BybitRestError::Rest(rest) if rest.is_transient() => {
                ExchangeError::Transient(rest.to_string())
            }
            BybitRestError::Rest(RestError::HttpError { status, message })
                if status == 401 || status == 403 =>
            {
                ExchangeError::Auth(message)
            }
            BybitRestError::Rest(rest) => ExchangeError::Decode(rest.to_string()),
            BybitRestError::ApiError { code, message } => classify_api_error(code, message),
            BybitRestError::Parse(message) => ExchangeError::Decode(message),
        }
    }
}

/// Map a Bybit `retCode` to the engine's error taxonomy.
fn classify_api_error(code: i64, message: String) -> ExchangeError {
    match code {
        // invalid key, bad signature, key expired, permission denied
        10003 | 10004 | 10005 | 33004 => ExchangeError::Auth(message),
        // timestamp out of recv window, rate limit, internal error, server busy
        10002 | 10006 | 10016 | 10018 => ExchangeError::Transient(message),
        _ => ExchangeError::Rejected { code, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: i64, message: &str) -> BybitRestError {
        BybitRestError::ApiError {
            code,
            message: message.into(),
        }
    }

    #[test]
    fn test_zero_position_detection() {
        let err = api(10001, "can not set tp/sl/ts for zero position");
        assert!(err.is_zero_position());
        assert!(matches!(ExchangeError::from(err), ExchangeError::NoPosition));

        assert!(!api(10001, "params error: qty invalid").is_zero_position());
    }

    #[test]
    fn test_classification() {
        assert!(matches!(
            ExchangeError::from(api(10003, "API key is invalid.")),
            ExchangeError::Auth(_)
        ));
        assert!(ExchangeError::from(api(10006, "Too many visits!")).is_transient());
        assert!(matches!(
            ExchangeError::from(api(170131, "Insufficient balance.")),
            ExchangeError::Rejected { code: 170131, .. }
        ));
        assert!(ExchangeError::from(BybitRestError::Rest(RestError::Timeout)).is_transient());
        assert!(matches!(
            ExchangeError::from(BybitRestError::Rest(RestError::HttpError {
                status: 403,
                message: "forbidden".into()
            })),
            ExchangeError::Auth(_)
        ));
    }

    #[test]
    fn test_leverage_not_modified() {
        assert!(api(110043, "leverage not modified").is_leverage_not_modified());
        assert!(!api(110044, "other").is_leverage_not_modified());
    }
}
