use model::Position;
use rust_decimal::Decimal;

/// Partial update of a position. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionPatch {
    pub order_qty: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub avg_price: Option<Decimal>,
    pub cum_exec_qty: Option<Decimal>,
    pub cum_exec_value: Option<Decimal>,
    pub cum_exec_fee: Option<Decimal>,
    pub filled: Option<bool>,
    pub tp_opened: Option<bool>,
    pub finished: Option<bool>,
}

impl PositionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execution facts of a completed order; also marks the record filled.
    pub fn fill(
        avg_price: Decimal,
        cum_exec_qty: Decimal,
        cum_exec_value: Decimal,
        cum_exec_fee: Decimal,
    ) -> Self {
        Self {
            avg_price: Some(avg_price),
            cum_exec_qty: Some(cum_exec_qty),
            cum_exec_value: Some(cum_exec_value),
            cum_exec_fee: Some(cum_exec_fee),
            filled: Some(true),
            ..Self::default()
        }
    }

    pub fn finished() -> Self {
        Self {
            finished: Some(true),
            ..Self::default()
        }
    }

    pub fn tp_opened(trigger_price: Decimal) -> Self {
        Self {
            tp_opened: Some(true),
            trigger_price: Some(trigger_price),
            ..Self::default()
        }
    }

    /// Forget an exit that never made it to, or was dropped by, the exchange.
    pub fn tp_cleared() -> Self {
        Self {
            tp_opened: Some(false),
            ..Self::default()
        }
    }

    pub fn trigger(trigger_price: Decimal) -> Self {
        Self {
            trigger_price: Some(trigger_price),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to a record. `finished` never goes back to false.
    pub fn apply(&self, position: &mut Position) {
        if let Some(v) = self.order_qty {
            position.order_qty = v;
        }
        if let Some(v) = self.trigger_price {
            position.trigger_price = Some(v);
        }
        if let Some(v) = self.avg_price {
            position.avg_price = v;
        }
        if let Some(v) = self.cum_exec_qty {
            position.cum_exec_qty = v;
        }
        if let Some(v) = self.cum_exec_value {
            position.cum_exec_value = v;
        }
        if let Some(v) = self.cum_exec_fee {
            position.cum_exec_fee = v;
        }
        if let Some(v) = self.filled {
            position.filled = v;
        }
        if let Some(v) = self.tp_opened {
            position.tp_opened = v;
        }
        if let Some(v) = self.finished {
            position.finished |= v;
        }
    }
}
