use crate::types::InstrumentClass;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trading rules for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub class: InstrumentClass,
    pub symbol: String,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub qty_step: Decimal,
    pub price_tick: Decimal,
    /// Linear only.
    pub min_leverage: Option<Decimal>,
    /// Linear only.
    pub max_leverage: Option<Decimal>,
}
