//! Bybit v5 key handling and request signing.
//!
//! Secrets live in a `SecretString` for their whole lifetime. A signed request
//! carries `X-BAPI-SIGN`, the hex HMAC-SHA256 of
//! `timestamp + api_key + recv_window + payload`, where the payload is the
//! query string of a GET or the raw JSON body of a POST.
//!
//! # Example
//!
//! ```rust,ignore
//! use auth::{ApiCredentials, RequestSigner};
//!
//! let credentials = ApiCredentials::new("key", "secret");
//! let signer = RequestSigner::new(&credentials);
//! let headers = signer.sign("category=linear&symbol=BTCUSDT", timestamp_ms);
//! ```

mod credentials;
mod error;
mod signer;

pub use credentials::ApiCredentials;
pub use error::AuthError;
pub use signer::{RequestSigner, SignedHeaders, DEFAULT_RECV_WINDOW_MS};
