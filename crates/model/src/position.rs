//! Position record and its pure state transitions.

use crate::types::{InstrumentClass, PositionKind, Side, Venue};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One order submitted on behalf of a user and everything learned about it.
///
/// `id` is the client order id the order was submitted with, so it doubles
/// as the key for correlating exchange listings with local records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub owner_id: i64,
    pub kind: PositionKind,
    pub venue: Venue,
    pub instrument_class: InstrumentClass,
    pub symbol: String,
    /// Id of the anchor this record modifies (averaging and tp only).
    pub depends_on: Option<String>,
    pub side: Side,
    pub order_qty: Decimal,
    pub trigger_price: Option<Decimal>,
    pub avg_price: Decimal,
    pub cum_exec_qty: Decimal,
    pub cum_exec_value: Decimal,
    pub cum_exec_fee: Decimal,
    pub filled: bool,
    pub tp_opened: bool,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
}

impl Position {
    /// A freshly submitted, unfilled order.
    #[allow(clippy::too_many_arguments)]
    pub fn submitted(
        id: String,
        owner_id: i64,
        kind: PositionKind,
        venue: Venue,
        instrument_class: InstrumentClass,
        symbol: String,
        side: Side,
        order_qty: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            kind,
            venue,
            instrument_class,
            symbol,
            depends_on: None,
            side,
            order_qty,
            trigger_price: None,
            avg_price: Decimal::ZERO,
            cum_exec_qty: Decimal::ZERO,
            cum_exec_value: Decimal::ZERO,
            cum_exec_fee: Decimal::ZERO,
            filled: false,
            tp_opened: false,
            finished: false,
            created_at,
        }
    }

    pub fn with_trigger(mut self, trigger_price: Decimal) -> Self {
        self.trigger_price = Some(trigger_price);
        self
    }

    pub fn depending_on(mut self, anchor_id: &str) -> Self {
        self.depends_on = Some(anchor_id.to_string());
        self
    }

    /// Non-finished main record.
    pub fn is_open_anchor(&self) -> bool {
        self.kind == PositionKind::Main && !self.finished
    }

    /// Anchor that can still be averaged or take-profited.
    pub fn is_active_anchor(&self) -> bool {
        self.is_open_anchor() && self.filled && !self.tp_opened
    }

    /// Child record that still blocks its anchor.
    pub fn is_unresolved_child(&self) -> bool {
        self.kind != PositionKind::Main && !self.finished
    }

    /// Quantity that can be sold back after the exchange took its fee.
    pub fn net_qty(&self) -> Decimal {
        (self.cum_exec_qty - self.cum_exec_fee).max(Decimal::ZERO)
    }

    /// Cost basis after absorbing a filled averaging record.
    ///
    /// Quantities, values and fees are summed; the average price is derived
    /// from the sums so the result does not depend on merge order.
    pub fn merged_with(&self, averaging: &Position) -> Position {
        let mut merged = self.clone();
        merged.cum_exec_qty += averaging.cum_exec_qty;
        merged.cum_exec_value += averaging.cum_exec_value;
        merged.cum_exec_fee += averaging.cum_exec_fee;
        merged.order_qty += averaging.order_qty;
        if !merged.cum_exec_qty.is_zero() {
            merged.avg_price = merged.cum_exec_value / merged.cum_exec_qty;
        }
        merged
    }
}
