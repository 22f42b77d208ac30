//! HTTP plumbing for the venue clients.
//!
//! Callers build the query string or JSON body themselves and sign it; this
//! crate sends those exact bytes, decodes the JSON answer, and turns transport
//! trouble into a `RestError` (429 answers carry their `Retry-After`).
//!
//! # Example
//!
//! ```rust,ignore
//! use rest_client::RestClient;
//!
//! let client = RestClient::with_default_timeout("https://api.bybit.com")?;
//! let tickers: serde_json::Value = client
//!     .get("/v5/market/tickers", Some("category=spot"), None)
//!     .await?;
//! ```

mod client;
mod error;

pub use client::{Headers, RestClient};
pub use error::RestError;
