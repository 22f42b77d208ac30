//! Test doubles and fixtures.

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::price_cache::{price_channel, PricePublisher, PriceSnapshot};
use async_trait::async_trait;
use auth::ApiCredentials;
use chrono::{Duration as ChronoDuration, Utc};
use execution_core::{
    Account, AmendRequest, ExchangeClient, ExchangeError, ExchangePosition, FilledOrder,
    OpenOrder, OrderAck, OrderRequest, SharedExchangeClient,
};
use metrics::create_metrics;
use model::{InstrumentClass, InstrumentSpec, Position, PositionKind, Side, TradingPairs, User, Venue};
use parking_lot::Mutex;
use position_store::{InMemoryPositionStore, InMemoryUserStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

type AccountKey = (i64, Venue);
type ListingKey = (i64, Venue, InstrumentClass);

/// Account listings that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listing {
    Positions,
    OpenOrders,
    FilledOrders,
}

#[derive(Default)]
struct MockState {
    tickers: HashMap<InstrumentClass, HashMap<String, Decimal>>,
    instruments: HashMap<InstrumentClass, Vec<InstrumentSpec>>,
    failing_tickers: HashSet<InstrumentClass>,
    failing_instruments: HashSet<InstrumentClass>,
    balances: HashMap<AccountKey, Decimal>,
    failing_balances: HashSet<AccountKey>,
    positions: HashMap<AccountKey, Vec<ExchangePosition>>,
    open_orders: HashMap<ListingKey, Vec<OpenOrder>>,
    filled: HashMap<ListingKey, Vec<FilledOrder>>,
    rejected_owners: HashSet<i64>,
    failing_listings: HashSet<Listing>,
    trailing_error: Option<ExchangeError>,
    leverage_error: Option<ExchangeError>,
    latency: Duration,

    placed: Vec<(i64, OrderRequest)>,
    amended: Vec<AmendRequest>,
    cancelled: Vec<String>,
    leverage_calls: Vec<(i64, String, Decimal)>,
    trailing_calls: Vec<(i64, String, Decimal)>,
    balance_calls: usize,
}

impl MockState {
    fn check_listing(&self, listing: Listing) -> Result<(), ExchangeError> {
        if self.failing_listings.contains(&listing) {
            return Err(ExchangeError::Transient(format!("{listing:?} unavailable")));
        }
        Ok(())
    }
}

/// Scriptable in-memory exchange that records every write.
#[derive(Default)]
pub struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, class: InstrumentClass, symbol: &str, price: Decimal) {
        self.state
            .lock()
            .tickers
            .entry(class)
            .or_default()
            .insert(symbol.to_string(), price);
        self.state.lock().failing_tickers.remove(&class);
    }

    pub fn fail_tickers(&self, class: InstrumentClass) {
        self.state.lock().failing_tickers.insert(class);
    }

    pub fn set_instruments(&self, class: InstrumentClass, specs: Vec<InstrumentSpec>) {
        self.state.lock().instruments.insert(class, specs);
    }

    pub fn fail_instruments(&self, class: InstrumentClass) {
        self.state.lock().failing_instruments.insert(class);
    }

    pub fn set_balance(&self, owner_id: i64, venue: Venue, balance: Decimal) {
        self.state.lock().balances.insert((owner_id, venue), balance);
    }

    pub fn fail_balance(&self, owner_id: i64, venue: Venue) {
        self.state.lock().failing_balances.insert((owner_id, venue));
    }

    pub fn set_positions(&self, owner_id: i64, venue: Venue, positions: Vec<ExchangePosition>) {
        self.state.lock().positions.insert((owner_id, venue), positions);
    }

    /// List a record as an open order on its account.
    pub fn rest(&self, position: &Position) {
        let order = OpenOrder {
            order_link_id: position.id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            qty: position.order_qty,
            trigger_price: position.trigger_price,
        };
        self.state
            .lock()
            .open_orders
            .entry((position.owner_id, position.venue, position.instrument_class))
            .or_default()
            .push(order);
    }

    /// Report a client order id as completely filled.
    pub fn fill(&self, position: &Position, avg_price: Decimal, qty: Decimal, fee: Decimal) {
        let order = FilledOrder {
            order_link_id: position.id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            avg_price,
            cum_exec_qty: qty,
            cum_exec_value: avg_price * qty,
            cum_exec_fee: fee,
        };
        self.state
            .lock()
            .filled
            .entry((position.owner_id, position.venue, position.instrument_class))
            .or_default()
            .push(order);
    }

    pub fn reject_orders_for(&self, owner_id: i64) {
        self.state.lock().rejected_owners.insert(owner_id);
    }

    pub fn accept_orders_for(&self, owner_id: i64) {
        self.state.lock().rejected_owners.remove(&owner_id);
    }

    pub fn fail_listing(&self, listing: Listing) {
        self.state.lock().failing_listings.insert(listing);
    }

    pub fn fail_trailing_stop(&self, err: ExchangeError) {
        self.state.lock().trailing_error = Some(err);
    }

    pub fn fail_leverage(&self, err: ExchangeError) {
        self.state.lock().leverage_error = Some(err);
    }

    /// Delay every write by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn placed(&self) -> Vec<(i64, OrderRequest)> {
        self.state.lock().placed.clone()
    }

    pub fn amended(&self) -> Vec<AmendRequest> {
        self.state.lock().amended.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().cancelled.clone()
    }

    pub fn leverage_calls(&self) -> Vec<(i64, String, Decimal)> {
        self.state.lock().leverage_calls.clone()
    }

    pub fn trailing_calls(&self) -> Vec<(i64, String, Decimal)> {
        self.state.lock().trailing_calls.clone()
    }

    pub fn balance_calls(&self) -> usize {
        self.state.lock().balance_calls
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn get_tickers(
        &self,
        class: InstrumentClass,
    ) -> Result<HashMap<String, Decimal>, ExchangeError> {
        let state = self.state.lock();
        if state.failing_tickers.contains(&class) {
            return Err(ExchangeError::Transient("tickers unavailable".into()));
        }
        Ok(state.tickers.get(&class).cloned().unwrap_or_default())
    }

    async fn get_instruments(
        &self,
        class: InstrumentClass,
    ) -> Result<Vec<InstrumentSpec>, ExchangeError> {
        let state = self.state.lock();
        if state.failing_instruments.contains(&class) {
            return Err(ExchangeError::Transient("instruments unavailable".into()));
        }
        Ok(state.instruments.get(&class).cloned().unwrap_or_default())
    }

    async fn get_balance(&self, account: &Account) -> Result<Decimal, ExchangeError> {
        let mut state = self.state.lock();
        state.balance_calls += 1;
        let key = (account.owner_id, account.venue);
        if state.failing_balances.contains(&key) {
            return Err(ExchangeError::Auth("invalid api key".into()));
        }
        Ok(state.balances.get(&key).copied().unwrap_or_default())
    }

    async fn get_positions(&self, account: &Account) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let state = self.state.lock();
        state.check_listing(Listing::Positions)?;
        Ok(state
            .positions
            .get(&(account.owner_id, account.venue))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_open_orders(
        &self,
        account: &Account,
        class: InstrumentClass,
    ) -> Result<Vec<OpenOrder>, ExchangeError> {
        let state = self.state.lock();
        state.check_listing(Listing::OpenOrders)?;
        Ok(state
            .open_orders
            .get(&(account.owner_id, account.venue, class))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_filled_orders(
        &self,
        account: &Account,
        class: InstrumentClass,
    ) -> Result<Vec<FilledOrder>, ExchangeError> {
        let state = self.state.lock();
        state.check_listing(Listing::FilledOrders)?;
        Ok(state
            .filled
            .get(&(account.owner_id, account.venue, class))
            .cloned()
            .unwrap_or_default())
    }

    async fn place_order(
        &self,
        account: &Account,
        order: &OrderRequest,
    ) -> Result<OrderAck, ExchangeError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        if state.rejected_owners.contains(&account.owner_id) {
            return Err(ExchangeError::Rejected {
                code: 170131,
                message: "Insufficient balance.".into(),
            });
        }
        state.placed.push((account.owner_id, order.clone()));
        Ok(OrderAck {
            order_id: format!("ex-{}", state.placed.len()),
            order_link_id: order.order_link_id.clone(),
        })
    }

    async fn amend_order(&self, _account: &Account, amend: &AmendRequest) -> Result<(), ExchangeError> {
        self.state.lock().amended.push(amend.clone());
        Ok(())
    }

    async fn cancel_order(
        &self,
        _account: &Account,
        _class: InstrumentClass,
        _symbol: &str,
        order_link_id: &str,
    ) -> Result<(), ExchangeError> {
        self.state.lock().cancelled.push(order_link_id.to_string());
        Ok(())
    }

    async fn set_leverage(
        &self,
        account: &Account,
        symbol: &str,
        leverage: Decimal,
    ) -> Result<(), ExchangeError> {
        let mut state = self.state.lock();
        state
            .leverage_calls
            .push((account.owner_id, symbol.to_string(), leverage));
        match &state.leverage_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn set_trailing_stop(
        &self,
        account: &Account,
        symbol: &str,
        distance: Decimal,
    ) -> Result<(), ExchangeError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state
            .trailing_calls
            .push((account.owner_id, symbol.to_string(), distance));
        match &state.trailing_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Subscribed demo user trading spot and linear with every feature on.
pub fn test_user(id: i64) -> User {
    User {
        id,
        demo: Some(ApiCredentials::new(format!("key-{id}"), format!("secret-{id}"))),
        real: None,
        trade_venue: Venue::Demo,
        spot_enabled: true,
        linear_enabled: true,
        min_trade: dec!(100),
        max_trade: dec!(1000),
        averaging_enabled: true,
        averaging_step_pct: dec!(5),
        averaging_multiplier: dec!(2),
        tp_activation_pct: dec!(2),
        tp_trail_pct: dec!(1),
        leverage: dec!(10),
        max_leverage: dec!(20),
        trade_acceptance_slippage_pct: dec!(0.1),
        trading_pairs: TradingPairs::All,
        stop_trading: false,
        subscription_expiry: Some(Utc::now() + ChronoDuration::days(30)),
    }
}

pub fn spot_spec(symbol: &str) -> InstrumentSpec {
    InstrumentSpec {
        class: InstrumentClass::Spot,
        symbol: symbol.to_string(),
        min_qty: dec!(0.1),
        max_qty: dec!(10000),
        qty_step: dec!(0.1),
        price_tick: dec!(0.01),
        min_leverage: None,
        max_leverage: None,
    }
}

pub fn linear_spec(symbol: &str) -> InstrumentSpec {
    InstrumentSpec {
        class: InstrumentClass::Linear,
        symbol: symbol.to_string(),
        min_qty: dec!(0.001),
        max_qty: dec!(100),
        qty_step: dec!(0.001),
        price_tick: dec!(0.5),
        min_leverage: Some(dec!(1)),
        max_leverage: Some(dec!(100)),
    }
}

/// A filled record as the reconciler would leave it.
#[allow(clippy::too_many_arguments)]
pub fn filled_position(
    id: &str,
    owner_id: i64,
    kind: PositionKind,
    class: InstrumentClass,
    symbol: &str,
    side: Side,
    avg_price: Decimal,
    qty: Decimal,
) -> Position {
    let mut p = Position::submitted(
        id.to_string(),
        owner_id,
        kind,
        Venue::Demo,
        class,
        symbol.to_string(),
        side,
        qty,
        Utc::now(),
    );
    p.avg_price = avg_price;
    p.cum_exec_qty = qty;
    p.cum_exec_value = avg_price * qty;
    p.filled = true;
    p
}

/// A context over in-memory collaborators with handles kept for assertions.
pub struct Harness {
    pub mock: Arc<MockExchange>,
    pub store: Arc<InMemoryPositionStore>,
    pub publisher: PricePublisher,
    pub ctx: EngineContext,
}

impl Harness {
    pub fn new(users: Vec<User>) -> Self {
        Self::with_config(users, EngineConfig::default())
    }

    pub fn with_config(users: Vec<User>, config: EngineConfig) -> Self {
        let mock = Arc::new(MockExchange::new());
        let store = Arc::new(InMemoryPositionStore::new());
        let user_store = Arc::new(InMemoryUserStore::new(users));
        let (publisher, reader) = price_channel();
        let exchange: SharedExchangeClient = mock.clone();

        let ctx = EngineContext::new(
            exchange,
            store.clone(),
            user_store,
            reader,
            create_metrics(),
            config,
        );

        Self {
            mock,
            store,
            publisher,
            ctx,
        }
    }

    /// Install specs, grouped per class.
    pub fn specs(&self, specs: Vec<InstrumentSpec>) {
        let now = Utc::now();
        for class in InstrumentClass::ALL {
            let of_class = specs.iter().filter(|s| s.class == class).cloned().collect();
            self.ctx.catalog.replace_class(class, of_class, now);
        }
    }

    /// Set one price on top of the current snapshot.
    pub fn price(&self, class: InstrumentClass, symbol: &str, price: Decimal) {
        let mut snapshot: PriceSnapshot = (*self.ctx.prices.latest()).clone();
        match class {
            InstrumentClass::Spot => snapshot.spot.insert(symbol.to_string(), price),
            InstrumentClass::Linear => snapshot.linear.insert(symbol.to_string(), price),
        };
        snapshot.captured_at = Some(Utc::now());
        self.publisher.publish(snapshot);
    }

    /// Republish the current prices as captured `age` ago.
    pub fn age_prices(&self, age: ChronoDuration) {
        let mut snapshot: PriceSnapshot = (*self.ctx.prices.latest()).clone();
        snapshot.captured_at = Some(Utc::now() - age);
        self.publisher.publish(snapshot);
    }
}
