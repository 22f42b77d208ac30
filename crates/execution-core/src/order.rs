//! Order requests and normalized exchange listings.

use model::{InstrumentClass, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction the last price must cross for a conditional order to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerDirection {
    /// Fires when price rises to the trigger.
    Rise,
    /// Fires when price falls to the trigger.
    Fall,
}

impl TriggerDirection {
    /// Bybit `triggerDirection` value.
    pub fn as_bybit_code(self) -> u8 {
        match self {
            Self::Rise => 1,
            Self::Fall => 2,
        }
    }

    /// Entry trigger for a side: buys wait for a rise, sells for a fall.
    pub fn for_entry(side: Side) -> Self {
        match side {
            Side::Buy => Self::Rise,
            Side::Sell => Self::Fall,
        }
    }
}

/// A market order, optionally conditional on a trigger price.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub class: InstrumentClass,
    pub symbol: String,
    pub side: Side,
    /// Base-coin quantity.
    pub qty: Decimal,
    pub order_link_id: String,
    pub trigger_price: Option<Decimal>,
    pub trigger_direction: Option<TriggerDirection>,
    pub reduce_only: bool,
}

impl OrderRequest {
    pub fn market(
        class: InstrumentClass,
        symbol: impl Into<String>,
        side: Side,
        qty: Decimal,
        order_link_id: impl Into<String>,
    ) -> Self {
        Self {
            class,
            symbol: symbol.into(),
            side,
            qty,
            order_link_id: order_link_id.into(),
            trigger_price: None,
            trigger_direction: None,
            reduce_only: false,
        }
    }

    pub fn triggered_at(mut self, price: Decimal, direction: TriggerDirection) -> Self {
        self.trigger_price = Some(price);
        self.trigger_direction = Some(direction);
        self
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.trigger_price.is_some()
    }
}

/// Change the trigger of an open conditional order.
#[derive(Debug, Clone, PartialEq)]
pub struct AmendRequest {
    pub class: InstrumentClass,
    pub symbol: String,
    pub order_link_id: String,
    pub trigger_price: Decimal,
}

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub order_id: String,
    pub order_link_id: String,
}

/// An order that is still working on the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_link_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub trigger_price: Option<Decimal>,
}

/// Execution facts of an order that is done executing.
#[derive(Debug, Clone, PartialEq)]
pub struct FilledOrder {
    pub order_link_id: String,
    pub symbol: String,
    pub side: Side,
    pub avg_price: Decimal,
    pub cum_exec_qty: Decimal,
    pub cum_exec_value: Decimal,
    pub cum_exec_fee: Decimal,
}

/// An open derivatives position as reported by the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub avg_price: Decimal,
    pub position_value: Decimal,
}
