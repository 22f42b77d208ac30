//! Engine error taxonomy.

use chrono::{DateTime, Utc};
use execution_core::{ExchangeError, SizingError};
use model::{InstrumentClass, Venue};
use position_store::StoreError;
use thiserror::Error;

/// Why one unit of work (a user, an order, a position) did not go through.
///
/// None of these abort a cycle; callers record them and move on.
#[derive(Debug, Error)]
pub enum TradeError {
    /// Skip the user for this cycle.
    #[error("no {venue} credentials for user {owner_id}")]
    CredentialsMissing { owner_id: i64, venue: Venue },

    /// Skip the user for this cycle.
    #[error("insufficient budget: {0}")]
    InsufficientBudget(String),

    /// Logged; only this order is skipped.
    #[error("exchange rejected: {0}")]
    ExchangeRejected(ExchangeError),

    /// Nothing to do; the next poll re-derives state from the exchange.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Forced cancel and finish.
    #[error("order {0} is stale")]
    StaleOrder(String),

    #[error("no {class} price for {symbol}")]
    MissingPrice {
        class: InstrumentClass,
        symbol: String,
    },

    /// The last snapshot is too old to trade on; wait for the next one.
    #[error("{class} price for {symbol} is stale (captured at {captured_at:?})")]
    StalePrice {
        class: InstrumentClass,
        symbol: String,
        captured_at: Option<DateTime<Utc>>,
    },

    #[error("no {class} instrument {symbol}")]
    MissingInstrument {
        class: InstrumentClass,
        symbol: String,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ExchangeError> for TradeError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Transient(msg) => TradeError::TransientNetwork(msg),
            other => TradeError::ExchangeRejected(other),
        }
    }
}

impl From<SizingError> for TradeError {
    fn from(err: SizingError) -> Self {
        TradeError::InsufficientBudget(err.to_string())
    }
}

impl TradeError {
    pub fn missing_price(class: InstrumentClass, symbol: &str) -> Self {
        Self::MissingPrice {
            class,
            symbol: symbol.to_string(),
        }
    }

    pub fn missing_instrument(class: InstrumentClass, symbol: &str) -> Self {
        Self::MissingInstrument {
            class,
            symbol: symbol.to_string(),
        }
    }
}
