//! Bybit v5 REST API client.
//!
//! Implements [`execution_core::ExchangeClient`] on top of `rest-client`:
//!
//! - **Two venues**: real accounts go to the configured environment
//!   (mainnet or testnet), demo accounts to the demo-trading host
//! - **Signing**: every private call carries `X-BAPI-*` headers produced by
//!   `auth::RequestSigner`
//! - **Normalization**: the `{retCode, retMsg, result}` envelope is unwrapped
//!   and decimal strings are parsed into `rust_decimal::Decimal`
//! - **Error handling**: return codes are classified into
//!   [`execution_core::ExchangeError`] variants
//!
//! # Example
//!
//! ```rust,ignore
//! use bybit_rest::BybitRestClient;
//! use common::BybitEnvironment;
//!
//! let client = BybitRestClient::new(BybitEnvironment::Mainnet)?;
//! let tickers = client.get_tickers(InstrumentClass::Spot).await?;
//! ```

mod client;
mod error;
mod responses;

pub use client::BybitRestClient;
pub use error::BybitRestError;
