use thiserror::Error;

/// Transport-level failures, before any venue envelope is looked at.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("http {status}: {message}")]
    HttpError { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    /// DNS, TLS or refused connection.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("malformed response body: {0}")]
    Parse(String),

    #[error("rate limited for {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("cannot build http client: {0}")]
    RequestBuild(String),
}

impl RestError {
    /// Whether the next poll can reasonably expect a different answer.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) | Self::RateLimited { .. } => true,
            Self::HttpError { status, .. } => *status >= 500,
            Self::Parse(_) | Self::RequestBuild(_) => false,
        }
    }
}

impl From<reqwest::Error> for RestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if err.is_decode() {
            return Self::Parse(err.to_string());
        }
        match err.status() {
            Some(status) if !err.is_connect() => Self::HttpError {
                status: status.as_u16(),
                message: err.to_string(),
            },
            _ => Self::Connection(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> RestError {
        RestError::HttpError { status, message: String::new() }
    }

    #[test]
    fn server_side_and_network_failures_are_transient() {
        assert!(RestError::Timeout.is_transient());
        assert!(RestError::Connection("reset".into()).is_transient());
        assert!(RestError::RateLimited { retry_after_ms: 1 }.is_transient());
        assert!(http(502).is_transient());
    }

    #[test]
    fn client_side_failures_are_not() {
        assert!(!http(403).is_transient());
        assert!(!RestError::Parse("bad".into()).is_transient());
        assert!(!RestError::RequestBuild("tls".into()).is_transient());
    }
}
