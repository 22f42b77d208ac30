//! Bybit REST API client.

use crate::error::BybitRestError;
use crate::responses::{
    ApiResponse, Ignored, InstrumentEntry, ListResult, OrderCreateResult, OrderEntry,
    PositionEntry, TickerEntry, WalletEntry,
};
use async_trait::async_trait;
use auth::RequestSigner;
use common::{BybitEnvironment, DEMO_REST_BASE_URL};
use execution_core::{
    Account, AmendRequest, ExchangeClient, ExchangeError, ExchangePosition, FilledOrder,
    OpenOrder, OrderAck, OrderRequest,
};
use model::{InstrumentClass, InstrumentSpec, Side, Venue, QUOTE_COIN};
use rest_client::RestClient;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Request timeout for Bybit API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound on cursor pages followed by one listing call.
const MAX_PAGES: usize = 20;

/// Bybit REST API client serving every account of every user.
pub struct BybitRestClient {
    /// Real accounts and public market data.
    live: RestClient,
    demo: RestClient,
    environment: BybitEnvironment,
}

impl BybitRestClient {
    /// # Errors
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(environment: BybitEnvironment) -> Result<Self, BybitRestError> {
        Ok(Self {
            live: RestClient::new(environment.rest_base_url(), REQUEST_TIMEOUT)?,
            demo: RestClient::new(DEMO_REST_BASE_URL, REQUEST_TIMEOUT)?,
            environment,
        })
    }

    fn rest_for(&self, venue: Venue) -> &RestClient {
        match venue {
            Venue::Demo => &self.demo,
            Venue::Real => &self.live,
        }
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, BybitRestError> {
        let query = build_query(params);
        let response: ApiResponse<T> = self.live.get(path, Some(&query), None).await?;
        response.into_result()
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        account: &Account,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<ApiResponse<T>, BybitRestError> {
        let query = build_query(params);
        let signed = RequestSigner::new(&account.credentials).sign(&query, timestamp_ms());
        let headers = signed.as_pairs();

        let response = self
            .rest_for(account.venue)
            .get(path, Some(&query), Some(&headers))
            .await?;
        Ok(response)
    }

    async fn signed_post<T: DeserializeOwned>(
        &self,
        account: &Account,
        path: &str,
        body: &Value,
    ) -> Result<ApiResponse<T>, BybitRestError> {
        let body = body.to_string();
        let signed = RequestSigner::new(&account.credentials).sign(&body, timestamp_ms());
        let headers = signed.as_pairs();

        let response = self
            .rest_for(account.venue)
            .post_json(path, &body, Some(&headers))
            .await?;
        Ok(response)
    }

    /// Follow `nextPageCursor` through a signed listing.
    async fn signed_list<T: DeserializeOwned>(
        &self,
        account: &Account,
        path: &str,
        params: Vec<(&str, String)>,
    ) -> Result<Vec<T>, BybitRestError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut page_params = params.clone();
            if let Some(c) = &cursor {
                page_params.push(("cursor", c.clone()));
            }

            let page: ListResult<T> = self
                .signed_get(account, path, &page_params)
                .await?
                .into_result()?;
            cursor = page.cursor().map(str::to_string);
            items.extend(page.list);

            if cursor.is_none() {
                break;
            }
        }

        Ok(items)
    }

    /// Orders of one class, conditional ones included.
    async fn order_listing(
        &self,
        account: &Account,
        path: &str,
        class: InstrumentClass,
    ) -> Result<Vec<OrderEntry>, BybitRestError> {
        let mut entries = Vec::new();
        for params in order_listing_params(class) {
            entries.extend(self.signed_list::<OrderEntry>(account, path, params).await?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl ExchangeClient for BybitRestClient {
    // ========================================================================
    // Market Data
    // ========================================================================

    /// GET /v5/market/tickers
    async fn get_tickers(
        &self,
        class: InstrumentClass,
    ) -> Result<HashMap<String, Decimal>, ExchangeError> {
        let page: ListResult<TickerEntry> = self
            .public_get("/v5/market/tickers", &[("category", class.category().to_string())])
            .await?;

        let prices: HashMap<String, Decimal> = page
            .list
            .into_iter()
            .filter_map(|t| t.last_price.map(|p| (t.symbol, p)))
            .collect();

        tracing::debug!(category = %class, symbols = prices.len(), "Tickers fetched");
        Ok(prices)
    }

    /// GET /v5/market/instruments-info, following the cursor.
    async fn get_instruments(
        &self,
        class: InstrumentClass,
    ) -> Result<Vec<InstrumentSpec>, ExchangeError> {
        let mut specs = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut params = vec![
                ("category", class.category().to_string()),
                ("limit", "1000".to_string()),
            ];
            if let Some(c) = &cursor {
                params.push(("cursor", c.clone()));
            }

            let page: ListResult<InstrumentEntry> = self
                .public_get("/v5/market/instruments-info", &params)
                .await?;
            cursor = page.cursor().map(str::to_string);
            specs.extend(page.list.into_iter().filter_map(|e| to_spec(class, e)));

            if cursor.is_none() {
                break;
            }
        }

        tracing::debug!(category = %class, instruments = specs.len(), "Instruments fetched");
        Ok(specs)
    }

    // ========================================================================
    // Account
    // ========================================================================

    /// GET /v5/account/wallet-balance
    async fn get_balance(&self, account: &Account) -> Result<Decimal, ExchangeError> {
        let page: ListResult<WalletEntry> = self
            .signed_get(
                account,
                "/v5/account/wallet-balance",
                &[
                    ("accountType", "UNIFIED".to_string()),
                    ("coin", QUOTE_COIN.to_string()),
                ],
            )
            .await?
            .into_result()?;

        Ok(page.list.iter().map(|w| w.total_wallet_balance).sum())
    }

    /// GET /v5/position/list
    async fn get_positions(
        &self,
        account: &Account,
    ) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let entries: Vec<PositionEntry> = self
            .signed_list(
                account,
                "/v5/position/list",
                vec![
                    ("category", InstrumentClass::Linear.category().to_string()),
                    ("settleCoin", QUOTE_COIN.to_string()),
                    ("limit", "200".to_string()),
                ],
            )
            .await?;

        Ok(entries
            .into_iter()
            .filter(|p| p.size > Decimal::ZERO)
            .filter_map(|p| {
                Some(ExchangePosition {
                    side: Side::from_bybit_str(&p.side)?,
                    symbol: p.symbol,
                    size: p.size,
                    avg_price: p.avg_price,
                    position_value: p.position_value,
                })
            })
            .collect())
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// GET /v5/order/realtime
    async fn get_open_orders(
        &self,
        account: &Account,
        class: InstrumentClass,
    ) -> Result<Vec<OpenOrder>, ExchangeError> {
        let entries = self
            .order_listing(account, "/v5/order/realtime", class)
            .await?;

        Ok(entries
            .into_iter()
            .filter_map(|o| {
                Some(OpenOrder {
                    side: Side::from_bybit_str(&o.side)?,
                    order_link_id: o.order_link_id,
                    symbol: o.symbol,
                    qty: o.qty,
                    trigger_price: o.trigger_price,
                })
            })
            .collect())
    }

    /// GET /v5/order/history, keeping orders that executed: filled, or
    /// cancelled after a partial fill.
    async fn get_filled_orders(
        &self,
        account: &Account,
        class: InstrumentClass,
    ) -> Result<Vec<FilledOrder>, ExchangeError> {
        let entries = self
            .order_listing(account, "/v5/order/history", class)
            .await?;

        Ok(entries
            .into_iter()
            .filter(|o| o.is_executed() && !o.order_link_id.is_empty())
            .filter_map(|o| {
                Some(FilledOrder {
                    side: Side::from_bybit_str(&o.side)?,
                    order_link_id: o.order_link_id,
                    symbol: o.symbol,
                    avg_price: o.avg_price,
                    cum_exec_qty: o.cum_exec_qty,
                    cum_exec_value: o.cum_exec_value,
                    cum_exec_fee: o.cum_exec_fee,
                })
            })
            .collect())
    }

    /// POST /v5/order/create
    async fn place_order(
        &self,
        account: &Account,
        order: &OrderRequest,
    ) -> Result<OrderAck, ExchangeError> {
        tracing::info!(
            owner_id = account.owner_id,
            venue = %account.venue,
            category = %order.class,
            symbol = %order.symbol,
            side = %order.side,
            qty = %order.qty,
            trigger_price = ?order.trigger_price,
            order_link_id = %order.order_link_id,
            "Placing order"
        );

        let result: OrderCreateResult = self
            .signed_post(account, "/v5/order/create", &order_body(order))
            .await?
            .into_result()?;

        tracing::info!(
            order_id = %result.order_id,
            order_link_id = %order.order_link_id,
            "Order placed"
        );

        Ok(OrderAck {
            order_id: result.order_id,
            order_link_id: order.order_link_id.clone(),
        })
    }

    /// POST /v5/order/amend
    async fn amend_order(
        &self,
        account: &Account,
        amend: &AmendRequest,
    ) -> Result<(), ExchangeError> {
        let body = json!({
            "category": amend.class.category(),
            "symbol": amend.symbol,
            "orderLinkId": amend.order_link_id,
            "triggerPrice": amend.trigger_price.to_string(),
        });

        self.signed_post::<Ignored>(account, "/v5/order/amend", &body)
            .await?
            .into_unit()?;

        tracing::info!(
            order_link_id = %amend.order_link_id,
            trigger_price = %amend.trigger_price,
            "Order amended"
        );
        Ok(())
    }

    /// POST /v5/order/cancel
    async fn cancel_order(
        &self,
        account: &Account,
        class: InstrumentClass,
        symbol: &str,
        order_link_id: &str,
    ) -> Result<(), ExchangeError> {
        let mut body = json!({
            "category": class.category(),
            "symbol": symbol,
            "orderLinkId": order_link_id,
        });
        // Spot conditional orders are only visible under the StopOrder filter.
        if class == InstrumentClass::Spot {
            body["orderFilter"] = json!("StopOrder");
        }

        tracing::info!(order_link_id = %order_link_id, symbol = %symbol, "Canceling order");

        self.signed_post::<Ignored>(account, "/v5/order/cancel", &body)
            .await?
            .into_unit()?;
        Ok(())
    }

    // ========================================================================
    // Positions
    // ========================================================================

    /// POST /v5/position/set-leverage
    async fn set_leverage(
        &self,
        account: &Account,
        symbol: &str,
        leverage: Decimal,
    ) -> Result<(), ExchangeError> {
        let leverage = leverage.normalize().to_string();
        let body = json!({
            "category": InstrumentClass::Linear.category(),
            "symbol": symbol,
            "buyLeverage": leverage,
            "sellLeverage": leverage,
        });

        match self
            .signed_post::<Ignored>(account, "/v5/position/set-leverage", &body)
            .await?
            .into_unit()
        {
            Err(e) if e.is_leverage_not_modified() => Ok(()),
            other => other.map_err(ExchangeError::from),
        }
    }

    /// POST /v5/position/trading-stop
    async fn set_trailing_stop(
        &self,
        account: &Account,
        symbol: &str,
        distance: Decimal,
    ) -> Result<(), ExchangeError> {
        let body = json!({
            "category": InstrumentClass::Linear.category(),
            "symbol": symbol,
            "tpslMode": "Full",
            "trailingStop": distance.normalize().to_string(),
            "positionIdx": 0,
        });

        tracing::info!(symbol = %symbol, distance = %distance, "Setting trailing stop");

        self.signed_post::<Ignored>(account, "/v5/position/trading-stop", &body)
            .await?
            .into_unit()?;
        Ok(())
    }
}

impl std::fmt::Debug for BybitRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitRestClient")
            .field("environment", &self.environment)
            .field("live_url", &self.live.base_url())
            .field("demo_url", &self.demo.base_url())
            .finish()
    }
}

fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn build_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn listing_params(class: InstrumentClass) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("category", class.category().to_string()),
        ("limit", "50".to_string()),
    ];
    if class == InstrumentClass::Linear {
        params.push(("settleCoin", QUOTE_COIN.to_string()));
    }
    params
}

/// Spot lists plain and conditional orders separately.
fn order_listing_params(class: InstrumentClass) -> Vec<Vec<(&'static str, String)>> {
    match class {
        InstrumentClass::Spot => ["Order", "StopOrder"]
            .into_iter()
            .map(|filter| {
                let mut params = listing_params(class);
                params.push(("orderFilter", filter.to_string()));
                params
            })
            .collect(),
        InstrumentClass::Linear => vec![listing_params(class)],
    }
}

/// JSON body of a market order, conditional when a trigger is set.
fn order_body(order: &OrderRequest) -> Value {
    let mut body = json!({
        "category": order.class.category(),
        "symbol": order.symbol,
        "side": order.side.as_bybit_str(),
        "orderType": "Market",
        "qty": order.qty.normalize().to_string(),
        "orderLinkId": order.order_link_id,
    });

    match order.class {
        InstrumentClass::Spot => {
            body["marketUnit"] = json!("baseCoin");
            if order.is_conditional() {
                body["orderFilter"] = json!("StopOrder");
            }
        }
        InstrumentClass::Linear => {
            if order.reduce_only {
                body["reduceOnly"] = json!(true);
            }
            if let Some(direction) = order.trigger_direction {
                body["triggerDirection"] = json!(direction.as_bybit_code());
            }
        }
    }

    if let Some(trigger) = order.trigger_price {
        body["triggerPrice"] = json!(trigger.normalize().to_string());
    }

    body
}

/// Keep tradable USDT instruments; for linear only perpetuals.
fn to_spec(class: InstrumentClass, entry: InstrumentEntry) -> Option<InstrumentSpec> {
    if entry.status != "Trading" || entry.quote_coin != QUOTE_COIN {
        return None;
    }

    let qty_step = match class {
        InstrumentClass::Spot => entry.lot_size_filter.base_precision?,
        InstrumentClass::Linear => {
            if entry.contract_type.as_deref() != Some("LinearPerpetual") {
                return None;
            }
            entry.lot_size_filter.qty_step?
        }
    };

    let leverage = entry.leverage_filter.filter(|_| class == InstrumentClass::Linear);

    Some(InstrumentSpec {
        class,
        symbol: entry.symbol,
        min_qty: entry.lot_size_filter.min_order_qty,
        max_qty: entry.lot_size_filter.max_order_qty,
        qty_step,
        price_tick: entry.price_filter.tick_size,
        min_leverage: leverage.as_ref().and_then(|l| l.min_leverage),
        max_leverage: leverage.as_ref().and_then(|l| l.max_leverage),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use execution_core::TriggerDirection;
    use rust_decimal_macros::dec;

    fn instrument(json: &str) -> InstrumentEntry {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_build_query_preserves_order() {
        let query = build_query(&[
            ("category", "linear".to_string()),
            ("symbol", "BTCUSDT".to_string()),
        ]);
        assert_eq!(query, "category=linear&symbol=BTCUSDT");
        assert_eq!(build_query(&[]), "");
    }

    #[test]
    fn test_linear_conditional_body() {
        let order = OrderRequest::market(
            InstrumentClass::Linear,
            "BTCUSDT",
            Side::Sell,
            dec!(0.010),
            "42_demo_linear_0123456789ab",
        )
        .triggered_at(dec!(49950.0), TriggerDirection::Fall);

        let body = order_body(&order);
        assert_eq!(body["category"], "linear");
        assert_eq!(body["side"], "Sell");
        assert_eq!(body["orderType"], "Market");
        assert_eq!(body["qty"], "0.01");
        assert_eq!(body["triggerPrice"], "49950");
        assert_eq!(body["triggerDirection"], 2);
        assert!(body.get("reduceOnly").is_none());
        assert!(body.get("orderFilter").is_none());
    }

    #[test]
    fn test_spot_bodies() {
        let conditional = OrderRequest::market(InstrumentClass::Spot, "SOLUSDT", Side::Buy, dec!(0.7), "id")
            .triggered_at(dec!(140.14), TriggerDirection::Rise);
        let body = order_body(&conditional);
        assert_eq!(body["marketUnit"], "baseCoin");
        assert_eq!(body["orderFilter"], "StopOrder");
        assert!(body.get("triggerDirection").is_none());

        let market = OrderRequest::market(InstrumentClass::Spot, "SOLUSDT", Side::Sell, dec!(0.7), "id");
        let body = order_body(&market);
        assert!(body.get("orderFilter").is_none());
        assert!(body.get("triggerPrice").is_none());
    }

    #[test]
    fn test_reduce_only_linear() {
        let order = OrderRequest::market(InstrumentClass::Linear, "ETHUSDT", Side::Buy, dec!(1), "id")
            .reduce_only();
        assert_eq!(order_body(&order)["reduceOnly"], true);
    }

    #[test]
    fn test_to_spec_spot_uses_base_precision() {
        let entry = instrument(
            r#"{
                "symbol": "SOLUSDT", "status": "Trading", "quoteCoin": "USDT",
                "lotSizeFilter": {"basePrecision": "0.001", "minOrderQty": "0.01", "maxOrderQty": "5000"},
                "priceFilter": {"tickSize": "0.01"}
            }"#,
        );
        let spec = to_spec(InstrumentClass::Spot, entry).unwrap();
        assert_eq!(spec.qty_step, dec!(0.001));
        assert_eq!(spec.min_qty, dec!(0.01));
        assert_eq!(spec.max_leverage, None);
    }

    #[test]
    fn test_to_spec_filters() {
        let delivery = instrument(
            r#"{
                "symbol": "BTCUSDT-27DEC24", "status": "Trading", "quoteCoin": "USDT",
                "contractType": "LinearFutures",
                "lotSizeFilter": {"qtyStep": "0.001", "minOrderQty": "0.001", "maxOrderQty": "100"},
                "priceFilter": {"tickSize": "0.5"}
            }"#,
        );
        assert!(to_spec(InstrumentClass::Linear, delivery).is_none());

        let usdc = instrument(
            r#"{
                "symbol": "BTCUSDC", "status": "Trading", "quoteCoin": "USDC",
                "lotSizeFilter": {"basePrecision": "0.000001", "minOrderQty": "0.0001", "maxOrderQty": "100"},
                "priceFilter": {"tickSize": "0.01"}
            }"#,
        );
        assert!(to_spec(InstrumentClass::Spot, usdc).is_none());

        let closed = instrument(
            r#"{
                "symbol": "OLDUSDT", "status": "Closed", "quoteCoin": "USDT",
                "lotSizeFilter": {"basePrecision": "1", "minOrderQty": "1", "maxOrderQty": "100"},
                "priceFilter": {"tickSize": "0.0001"}
            }"#,
        );
        assert!(to_spec(InstrumentClass::Spot, closed).is_none());
    }

    #[test]
    fn test_listing_params() {
        assert!(listing_params(InstrumentClass::Linear)
            .iter()
            .any(|(k, v)| *k == "settleCoin" && v == "USDT"));
        assert!(!listing_params(InstrumentClass::Spot)
            .iter()
            .any(|(k, _)| *k == "settleCoin"));
    }

    #[test]
    fn test_spot_order_listings_cover_conditional_orders() {
        let filters: Vec<String> = order_listing_params(InstrumentClass::Spot)
            .into_iter()
            .filter_map(|params| {
                params
                    .into_iter()
                    .find(|(k, _)| *k == "orderFilter")
                    .map(|(_, v)| v)
            })
            .collect();
        assert_eq!(filters, vec!["Order".to_string(), "StopOrder".to_string()]);

        let linear = order_listing_params(InstrumentClass::Linear);
        assert_eq!(linear.len(), 1);
        assert!(!linear[0].iter().any(|(k, _)| *k == "orderFilter"));
    }
}
