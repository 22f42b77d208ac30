//! Bybit v5 response types.
//!
//! Bybit sends every number as a string and uses `""` for "not set", so the
//! decimal fields go through the helpers at the bottom of this file.

use crate::error::BybitRestError;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

/// The `{retCode, retMsg, result}` envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    pub result: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the result of a successful call.
    pub fn into_result(self) -> Result<T, BybitRestError> {
        if self.ret_code != 0 {
            return Err(BybitRestError::ApiError {
                code: self.ret_code,
                message: self.ret_msg,
            });
        }
        self.result
            .ok_or_else(|| BybitRestError::Parse("missing result".to_string()))
    }

    /// Check the return code of a call whose result is not needed.
    pub fn into_unit(self) -> Result<(), BybitRestError> {
        if self.ret_code != 0 {
            return Err(BybitRestError::ApiError {
                code: self.ret_code,
                message: self.ret_msg,
            });
        }
        Ok(())
    }
}

/// A list page, optionally with a cursor to the next one.
#[derive(Debug, Deserialize)]
pub struct ListResult<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
    #[serde(rename = "nextPageCursor", default)]
    pub next_page_cursor: Option<String>,
}

impl<T> ListResult<T> {
    pub fn cursor(&self) -> Option<&str> {
        self.next_page_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// Entry of GET /v5/market/tickers.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerEntry {
    pub symbol: String,
    #[serde(rename = "lastPrice", deserialize_with = "decimal_or_none")]
    pub last_price: Option<Decimal>,
}

/// Entry of GET /v5/market/instruments-info.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentEntry {
    pub symbol: String,
    pub status: String,
    #[serde(rename = "quoteCoin")]
    pub quote_coin: String,
    #[serde(rename = "contractType", default)]
    pub contract_type: Option<String>,
    #[serde(rename = "lotSizeFilter")]
    pub lot_size_filter: LotSizeFilter,
    #[serde(rename = "priceFilter")]
    pub price_filter: PriceFilter,
    #[serde(rename = "leverageFilter", default)]
    pub leverage_filter: Option<LeverageFilter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LotSizeFilter {
    /// Spot lot step.
    #[serde(rename = "basePrecision", default, deserialize_with = "decimal_or_none")]
    pub base_precision: Option<Decimal>,
    /// Linear lot step.
    #[serde(rename = "qtyStep", default, deserialize_with = "decimal_or_none")]
    pub qty_step: Option<Decimal>,
    #[serde(rename = "minOrderQty", deserialize_with = "decimal_or_zero")]
    pub min_order_qty: Decimal,
    #[serde(rename = "maxOrderQty", deserialize_with = "decimal_or_zero")]
    pub max_order_qty: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceFilter {
    #[serde(rename = "tickSize", deserialize_with = "decimal_or_zero")]
    pub tick_size: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeverageFilter {
    #[serde(rename = "minLeverage", deserialize_with = "decimal_or_none")]
    pub min_leverage: Option<Decimal>,
    #[serde(rename = "maxLeverage", deserialize_with = "decimal_or_none")]
    pub max_leverage: Option<Decimal>,
}

/// Entry of GET /v5/account/wallet-balance.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletEntry {
    #[serde(rename = "totalWalletBalance", deserialize_with = "decimal_or_zero")]
    pub total_wallet_balance: Decimal,
}

/// Entry of GET /v5/position/list.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionEntry {
    pub symbol: String,
    /// `""` when the slot is empty.
    pub side: String,
    #[serde(deserialize_with = "decimal_or_zero")]
    pub size: Decimal,
    #[serde(rename = "avgPrice", deserialize_with = "decimal_or_zero")]
    pub avg_price: Decimal,
    #[serde(rename = "positionValue", deserialize_with = "decimal_or_zero")]
    pub position_value: Decimal,
}

/// Entry of GET /v5/order/realtime and /v5/order/history.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderEntry {
    #[serde(rename = "orderLinkId", default)]
    pub order_link_id: String,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "orderStatus")]
    pub order_status: String,
    #[serde(deserialize_with = "decimal_or_zero")]
    pub qty: Decimal,
    #[serde(rename = "triggerPrice", default, deserialize_with = "decimal_or_none")]
    pub trigger_price: Option<Decimal>,
    #[serde(rename = "avgPrice", default, deserialize_with = "decimal_or_zero")]
    pub avg_price: Decimal,
    #[serde(rename = "cumExecQty", default, deserialize_with = "decimal_or_zero")]
    pub cum_exec_qty: Decimal,
    #[serde(rename = "cumExecValue", default, deserialize_with = "decimal_or_zero")]
    pub cum_exec_value: Decimal,
    #[serde(rename = "cumExecFee", default, deserialize_with = "decimal_or_zero")]
    pub cum_exec_fee: Decimal,
}

impl OrderEntry {
    /// Done trading with something executed: fully filled, or cancelled
    /// after a partial fill.
    pub fn is_executed(&self) -> bool {
        match self.order_status.as_str() {
            "Filled" => true,
            "PartiallyFilledCanceled" => self.cum_exec_qty > Decimal::ZERO,
            _ => false,
        }
    }
}

/// Result of POST /v5/order/create.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreateResult {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "orderLinkId", default)]
    pub order_link_id: String,
}

/// Placeholder for endpoints whose result object is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Ignored {}

fn parse_decimal(s: &str) -> Result<Option<Decimal>, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map(Some)
        .map_err(|e| format!("invalid decimal {s:?}: {e}"))
}

fn decimal_or_none<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let value = parse_decimal(&s).map_err(serde::de::Error::custom)?;
    Ok(value.filter(|d| !d.is_zero()))
}

fn decimal_or_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_decimal(&s)
        .map(|d| d.unwrap_or(Decimal::ZERO))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_envelope_error() {
        let json = r#"{"retCode": 10001, "retMsg": "params error", "result": {}}"#;
        let response: ApiResponse<Ignored> = serde_json::from_str(json).unwrap();
        assert!(matches!(
            response.into_result(),
            Err(BybitRestError::ApiError { code: 10001, .. })
        ));
    }

    #[test]
    fn test_deserialize_instruments_page() {
        let json = r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "linear",
                "list": [{
                    "symbol": "BTCUSDT",
                    "contractType": "LinearPerpetual",
                    "status": "Trading",
                    "quoteCoin": "USDT",
                    "leverageFilter": {"minLeverage": "1", "maxLeverage": "100.00", "leverageStep": "0.01"},
                    "priceFilter": {"minPrice": "0.10", "maxPrice": "199999.80", "tickSize": "0.10"},
                    "lotSizeFilter": {"maxOrderQty": "100.000", "minOrderQty": "0.001", "qtyStep": "0.001"}
                }],
                "nextPageCursor": "first%3DBTCUSDT"
            }
        }"#;

        let response: ApiResponse<ListResult<InstrumentEntry>> = serde_json::from_str(json).unwrap();
        let page = response.into_result().unwrap();

        assert_eq!(page.cursor(), Some("first%3DBTCUSDT"));
        let entry = &page.list[0];
        assert_eq!(entry.lot_size_filter.qty_step, Some(dec!(0.001)));
        assert_eq!(entry.lot_size_filter.base_precision, None);
        assert_eq!(entry.price_filter.tick_size, dec!(0.1));
        assert_eq!(
            entry.leverage_filter.as_ref().and_then(|l| l.max_leverage),
            Some(dec!(100))
        );
    }

    #[test]
    fn test_deserialize_filled_order() {
        let json = r#"{
            "orderLinkId": "42_demo_spot_0123456789ab",
            "symbol": "SOLUSDT",
            "side": "Buy",
            "orderStatus": "Filled",
            "qty": "0.7",
            "triggerPrice": "140.14",
            "avgPrice": "140.2",
            "cumExecQty": "0.7",
            "cumExecValue": "98.14",
            "cumExecFee": "0.0007"
        }"#;

        let order: OrderEntry = serde_json::from_str(json).unwrap();
        assert_eq!(order.cum_exec_value, dec!(98.14));
        assert_eq!(order.trigger_price, Some(dec!(140.14)));
        assert!(order.is_executed());
    }

    #[test]
    fn test_partial_cancel_counts_only_with_execution() {
        let entry = |status: &str, executed: &str| -> OrderEntry {
            serde_json::from_str(&format!(
                r#"{{"orderLinkId": "x", "symbol": "SOLUSDT", "side": "Sell",
                    "orderStatus": "{status}", "qty": "1", "cumExecQty": "{executed}"}}"#
            ))
            .unwrap()
        };

        assert!(entry("PartiallyFilledCanceled", "0.4").is_executed());
        assert!(!entry("PartiallyFilledCanceled", "0").is_executed());
        assert!(!entry("Cancelled", "0").is_executed());
        assert!(!entry("PartiallyFilled", "0.4").is_executed());
    }

    #[test]
    fn test_empty_and_zero_strings() {
        let json = r#"{
            "orderLinkId": "",
            "symbol": "BTCUSDT",
            "side": "Sell",
            "orderStatus": "New",
            "qty": "0.01",
            "triggerPrice": "0",
            "avgPrice": ""
        }"#;

        let order: OrderEntry = serde_json::from_str(json).unwrap();
        assert_eq!(order.trigger_price, None);
        assert_eq!(order.avg_price, Decimal::ZERO);
        assert_eq!(order.cum_exec_qty, Decimal::ZERO);
    }

    #[test]
    fn test_cursor_empty_is_none() {
        let page: ListResult<TickerEntry> =
            serde_json::from_str(r#"{"list": [], "nextPageCursor": ""}"#).unwrap();
        assert_eq!(page.cursor(), None);
    }
}
