//! Signal Dispatcher: one directional signal into a batch of entry orders.

use crate::context::EngineContext;
use crate::error::TradeError;
use chrono::{DateTime, Utc};
use execution_core::sizing::{floor_to_step, round_price, shift_by_pct, size_order};
use execution_core::{
    generate_client_order_id, Account, ExchangeError, OrderAck, OrderRequest, TriggerDirection,
};
use futures_util::future::join_all;
use model::{
    symbol_for_coin, InstrumentClass, InstrumentSpec, Position, PositionKind, Side, Signal, User,
};
use position_store::PositionFilter;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// A user left out of a dispatch and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedUser {
    pub owner_id: i64,
    pub class: InstrumentClass,
    pub reason: String,
}

/// Outcome of dispatching one signal.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub symbol: String,
    /// Client order ids of acknowledged orders.
    pub placed: Vec<String>,
    pub skipped: Vec<SkippedUser>,
    pub rejected: Vec<SkippedUser>,
}

impl DispatchReport {
    fn skip(&mut self, owner_id: i64, class: InstrumentClass, reason: impl ToString) {
        self.skipped.push(SkippedUser {
            owner_id,
            class,
            reason: reason.to_string(),
        });
    }
}

/// A user that passed every eligibility check for one class.
struct Candidate<'a> {
    user: &'a User,
    account: Account,
    class: InstrumentClass,
    spec: &'a InstrumentSpec,
    price: Decimal,
}

/// A sized order ready to submit.
struct Entry {
    account: Account,
    order: OrderRequest,
    leverage: Option<Decimal>,
}

/// Entry side and trigger direction for a signal in a class, if actionable.
///
/// Spot is long-only.
fn entry_side(class: InstrumentClass, direction: Side) -> Option<(Side, TriggerDirection)> {
    match (class, direction) {
        (InstrumentClass::Spot, Side::Sell) => None,
        (_, side) => Some((side, TriggerDirection::for_entry(side))),
    }
}

/// Trigger price shifted by slippage against the entry, floored to tick.
fn entry_trigger(price: Decimal, side: Side, slippage_pct: Decimal, tick: Decimal) -> Decimal {
    let pct = match side {
        Side::Buy => slippage_pct,
        Side::Sell => -slippage_pct,
    };
    round_price(shift_by_pct(price, pct), tick)
}

/// Leverage applied to a linear entry.
fn entry_leverage(user: &User, spec: &InstrumentSpec) -> Decimal {
    let leverage = user.leverage.min(user.max_leverage);
    match spec.max_leverage {
        Some(max) => leverage.min(max),
        None => leverage,
    }
}

fn size_entry(candidate: &Candidate<'_>, side: Side, budget: Decimal) -> Result<(Decimal, Decimal), TradeError> {
    let spec = candidate.spec;
    let amount = budget.min(candidate.user.min_trade);
    let trigger = entry_trigger(
        candidate.price,
        side,
        candidate.user.trade_acceptance_slippage_pct,
        spec.price_tick,
    );
    let qty = size_order(amount, trigger, spec.min_qty, spec.qty_step)?;
    let qty = floor_to_step(qty.min(spec.max_qty), spec.qty_step);
    Ok((qty, trigger))
}

/// Turn one signal into conditional market entries for every eligible user.
///
/// Users are skipped, never failed: a missing credential, an unreachable
/// balance or a rejected order only affects that user.
pub async fn dispatch(
    ctx: &EngineContext,
    signal: &Signal,
    now: DateTime<Utc>,
) -> Result<DispatchReport, TradeError> {
    let symbol = symbol_for_coin(&signal.coin);
    let mut report = DispatchReport {
        symbol: symbol.clone(),
        ..DispatchReport::default()
    };
    ctx.metrics.inc_signals_received();

    let users = ctx.users.active_users(now).await?;
    let is_new = ctx.catalog.is_new_listing(&signal.coin, now);
    let open_mains = ctx
        .positions
        .query(&PositionFilter::open().kind(PositionKind::Main).symbol(&symbol))
        .await?;

    let mut class_inputs = Vec::new();
    for class in InstrumentClass::ALL {
        if entry_side(class, signal.direction).is_none() {
            debug!(symbol = %symbol, class = %class, direction = %signal.direction, "Signal not actionable for class");
            continue;
        }
        match (ctx.spec(class, &symbol), ctx.price(class, &symbol, now)) {
            (Ok(spec), Ok(price)) => class_inputs.push((class, spec, price)),
            (Err(e), _) | (_, Err(e)) => {
                warn!(symbol = %symbol, class = %class, error = %e, "Skipping class for signal");
            }
        }
    }

    let mut candidates = Vec::new();
    for (class, spec, price) in &class_inputs {
        for user in &users {
            if !user.trades(*class) || !user.trading_pairs.allows(&signal.coin, is_new) {
                continue;
            }

            let holds = open_mains.iter().any(|p| {
                p.owner_id == user.id && p.venue == user.trade_venue && p.instrument_class == *class
            });
            if holds {
                report.skip(user.id, *class, "already holds an open position");
                continue;
            }

            match ctx.account(user, user.trade_venue) {
                Ok(account) => candidates.push(Candidate {
                    user,
                    account,
                    class: *class,
                    spec,
                    price: *price,
                }),
                Err(e) => report.skip(user.id, *class, e),
            }
        }
    }

    // One balance call per user, shared by both classes.
    let mut accounts: HashMap<i64, &Account> = HashMap::new();
    for c in &candidates {
        accounts.entry(c.user.id).or_insert(&c.account);
    }
    let (ids, balance_calls): (Vec<i64>, Vec<_>) = accounts
        .into_iter()
        .map(|(id, account)| (id, ctx.exchange.get_balance(account)))
        .unzip();
    let budgets: HashMap<i64, Result<Decimal, ExchangeError>> =
        ids.into_iter().zip(join_all(balance_calls).await).collect();

    let mut entries = Vec::new();
    for candidate in &candidates {
        let owner_id = candidate.user.id;
        let budget = match budgets.get(&owner_id) {
            Some(Ok(budget)) => *budget,
            Some(Err(e)) => {
                warn!(owner_id, error = %e, "Balance fetch failed, skipping user");
                report.skip(owner_id, candidate.class, e);
                continue;
            }
            None => continue,
        };

        let Some((side, direction)) = entry_side(candidate.class, signal.direction) else {
            continue;
        };

        match size_entry(candidate, side, budget) {
            Ok((qty, trigger)) => {
                let order_link_id = generate_client_order_id(
                    owner_id,
                    candidate.account.venue,
                    candidate.class,
                );
                let order = OrderRequest::market(candidate.class, &symbol, side, qty, order_link_id)
                    .triggered_at(trigger, direction);
                let leverage = (candidate.class == InstrumentClass::Linear)
                    .then(|| entry_leverage(candidate.user, candidate.spec));
                entries.push(Entry {
                    account: candidate.account.clone(),
                    order,
                    leverage,
                });
            }
            Err(e) => {
                debug!(owner_id, symbol = %symbol, %budget, error = %e, "User cannot afford entry");
                report.skip(owner_id, candidate.class, e);
            }
        }
    }

    let submissions = entries.iter().map(|entry| submit(ctx, entry));
    let results = join_all(submissions).await;

    for (entry, result) in entries.iter().zip(results) {
        let owner_id = entry.account.owner_id;
        let class = entry.order.class;
        match result {
            Ok(ack) => {
                let position = Position::submitted(
                    ack.order_link_id.clone(),
                    owner_id,
                    PositionKind::Main,
                    entry.account.venue,
                    class,
                    symbol.clone(),
                    entry.order.side,
                    entry.order.qty,
                    now,
                );
                let position = match entry.order.trigger_price {
                    Some(trigger) => position.with_trigger(trigger),
                    None => position,
                };

                if let Err(e) = ctx.positions.upsert(position).await {
                    error!(owner_id, order_link_id = %ack.order_link_id, error = %e, "Order placed but not recorded");
                    report.rejected.push(SkippedUser {
                        owner_id,
                        class,
                        reason: e.to_string(),
                    });
                    continue;
                }

                ctx.metrics.inc_orders_placed();
                report.placed.push(ack.order_link_id);
            }
            Err(e) => {
                warn!(owner_id, symbol = %symbol, class = %class, error = %e, "Entry order rejected");
                ctx.metrics.inc_orders_rejected();
                report.rejected.push(SkippedUser {
                    owner_id,
                    class,
                    reason: e.to_string(),
                });
            }
        }
    }

    ctx.metrics.add_users_skipped(report.skipped.len() as u64);
    info!(
        symbol = %symbol,
        direction = %signal.direction,
        placed = report.placed.len(),
        skipped = report.skipped.len(),
        rejected = report.rejected.len(),
        "Signal dispatched"
    );
    Ok(report)
}

async fn submit(ctx: &EngineContext, entry: &Entry) -> Result<OrderAck, ExchangeError> {
    if let Some(leverage) = entry.leverage {
        if let Err(e) = ctx
            .exchange
            .set_leverage(&entry.account, &entry.order.symbol, leverage)
            .await
        {
            warn!(
                owner_id = entry.account.owner_id,
                symbol = %entry.order.symbol,
                %leverage,
                error = %e,
                "Set leverage failed, submitting anyway"
            );
        }
    }
    ctx.exchange.place_order(&entry.account, &entry.order).await
}
