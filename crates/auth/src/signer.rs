//! HMAC-SHA256 request signing for Bybit v5.

use crate::credentials::ApiCredentials;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Receive window sent with every signed request.
pub const DEFAULT_RECV_WINDOW_MS: u64 = 5000;

/// Header values for one signed request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub api_key: String,
    pub timestamp: String,
    pub recv_window: String,
    pub signature: String,
}

impl SignedHeaders {
    /// Header pairs in the form the REST client accepts.
    pub fn as_pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("X-BAPI-API-KEY", self.api_key.as_str()),
            ("X-BAPI-TIMESTAMP", self.timestamp.as_str()),
            ("X-BAPI-RECV-WINDOW", self.recv_window.as_str()),
            ("X-BAPI-SIGN", self.signature.as_str()),
        ]
    }
}

/// Request signer for authenticated Bybit calls.
pub struct RequestSigner<'a> {
    credentials: &'a ApiCredentials,
    recv_window_ms: u64,
}

impl<'a> RequestSigner<'a> {
    pub fn new(credentials: &'a ApiCredentials) -> Self {
        Self {
            credentials,
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
        }
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    /// Hex-encoded HMAC-SHA256 of `message` under the secret key.
    pub fn hmac_hex(&self, message: &str) -> String {
        let mut mac = match HmacSha256::new_from_slice(self.credentials.expose_secret().as_bytes())
        {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 takes keys of any size"),
        };
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Sign a request payload.
    ///
    /// `payload` is the query string (without `?`) for GET or the exact JSON
    /// body for POST.
    pub fn sign(&self, payload: &str, timestamp_ms: i64) -> SignedHeaders {
        let timestamp = timestamp_ms.to_string();
        let recv_window = self.recv_window_ms.to_string();
        let prehash = format!(
            "{}{}{}{}",
            timestamp,
            self.credentials.api_key(),
            recv_window,
            payload
        );

        SignedHeaders {
            api_key: self.credentials.api_key().to_string(),
            signature: self.hmac_hex(&prehash),
            timestamp,
            recv_window,
        }
    }
}
