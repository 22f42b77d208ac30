//! The exchange seam.

use crate::error::ExchangeError;
use crate::order::{
    AmendRequest, ExchangePosition, FilledOrder, OpenOrder, OrderAck, OrderRequest,
};
use async_trait::async_trait;
use auth::ApiCredentials;
use model::{InstrumentClass, InstrumentSpec, Venue};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// The account a private call acts on.
#[derive(Debug, Clone)]
pub struct Account {
    pub owner_id: i64,
    pub venue: Venue,
    pub credentials: ApiCredentials,
}

impl Account {
    pub fn new(owner_id: i64, venue: Venue, credentials: ApiCredentials) -> Self {
        Self {
            owner_id,
            venue,
            credentials,
        }
    }
}

/// Signed access to one exchange on behalf of many accounts.
///
/// Every method returns a normalized value or a typed [`ExchangeError`];
/// none of them retry.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Last price per symbol for one instrument class.
    async fn get_tickers(
        &self,
        class: InstrumentClass,
    ) -> Result<HashMap<String, Decimal>, ExchangeError>;

    /// Tradable USDT instruments of one class.
    async fn get_instruments(
        &self,
        class: InstrumentClass,
    ) -> Result<Vec<InstrumentSpec>, ExchangeError>;

    /// Total USDT wallet balance.
    async fn get_balance(&self, account: &Account) -> Result<Decimal, ExchangeError>;

    /// Open linear positions with non-zero size.
    async fn get_positions(&self, account: &Account)
        -> Result<Vec<ExchangePosition>, ExchangeError>;

    async fn get_open_orders(
        &self,
        account: &Account,
        class: InstrumentClass,
    ) -> Result<Vec<OpenOrder>, ExchangeError>;

    /// Recently completed orders with their execution facts.
    async fn get_filled_orders(
        &self,
        account: &Account,
        class: InstrumentClass,
    ) -> Result<Vec<FilledOrder>, ExchangeError>;

    async fn place_order(
        &self,
        account: &Account,
        order: &OrderRequest,
    ) -> Result<OrderAck, ExchangeError>;

    async fn amend_order(
        &self,
        account: &Account,
        amend: &AmendRequest,
    ) -> Result<(), ExchangeError>;

    async fn cancel_order(
        &self,
        account: &Account,
        class: InstrumentClass,
        symbol: &str,
        order_link_id: &str,
    ) -> Result<(), ExchangeError>;

    /// Set buy and sell leverage of a linear symbol. An unchanged leverage
    /// is a success.
    async fn set_leverage(
        &self,
        account: &Account,
        symbol: &str,
        leverage: Decimal,
    ) -> Result<(), ExchangeError>;

    /// Attach a trailing stop of `distance` (quote units) to a linear position.
    async fn set_trailing_stop(
        &self,
        account: &Account,
        symbol: &str,
        distance: Decimal,
    ) -> Result<(), ExchangeError>;
}

pub type SharedExchangeClient = Arc<dyn ExchangeClient>;
