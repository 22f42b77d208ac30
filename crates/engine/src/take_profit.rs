//! Take-Profit Engine.
//!
//! Per anchor: `filled` -> `tp_opened` -> finished. Linear anchors get an
//! exchange-side trailing stop; spot anchors get a conditional exit order
//! whose trigger this engine keeps ratcheting while the price runs.

use crate::context::EngineContext;
use crate::error::TradeError;
use execution_core::sizing::{floor_to_step, round_price, shift_by_pct};
use execution_core::{
    generate_client_order_id, AmendRequest, ExchangeError, OrderRequest, TriggerDirection,
};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use model::{InstrumentClass, Position, PositionKind, Side};
use position_store::{PositionFilter, PositionPatch};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct TpReport {
    /// Anchors that got a take-profit this cycle.
    pub activated: Vec<String>,
    /// Tp records whose trigger moved.
    pub ratcheted: Vec<String>,
    /// Record id and error.
    pub failed: Vec<(String, String)>,
}

/// Whether `price` moved at least `activation_pct` in the anchor's favor.
pub fn activation_reached(
    side: Side,
    avg_price: Decimal,
    price: Decimal,
    activation_pct: Decimal,
) -> bool {
    match side {
        Side::Buy => price >= shift_by_pct(avg_price, activation_pct),
        Side::Sell => price <= shift_by_pct(avg_price, -activation_pct),
    }
}

/// Exit trigger trailing `price` by `trail_pct` for a position on `side`.
pub fn trailing_trigger(side: Side, price: Decimal, trail_pct: Decimal, tick: Decimal) -> Decimal {
    let pct = match side {
        Side::Buy => -trail_pct,
        Side::Sell => trail_pct,
    };
    round_price(shift_by_pct(price, pct), tick)
}

/// Whether `candidate` is strictly more favorable than `current` for an
/// exit order on `exit_side`.
pub fn is_tighter(exit_side: Side, candidate: Decimal, current: Decimal) -> bool {
    match exit_side {
        Side::Sell => candidate > current,
        Side::Buy => candidate < current,
    }
}

fn exit_direction(exit_side: Side) -> TriggerDirection {
    match exit_side {
        Side::Sell => TriggerDirection::Fall,
        Side::Buy => TriggerDirection::Rise,
    }
}

/// Activate pending take-profits, then ratchet open spot exits.
pub async fn run_cycle(ctx: &EngineContext) -> Result<TpReport, TradeError> {
    let mut report = TpReport::default();
    let now = Utc::now();
    if !ctx.prices_fresh(now) {
        debug!(
            captured_at = ?ctx.prices.latest().captured_at,
            "No fresh prices, skipping take-profit cycle"
        );
        return Ok(report);
    }

    let anchors = ctx
        .positions
        .query(
            &PositionFilter::open()
                .kind(PositionKind::Main)
                .filled(true)
                .tp_opened(false),
        )
        .await?;

    let results = join_all(anchors.iter().map(|a| activate(ctx, &a.id, now))).await;
    for (anchor, result) in anchors.iter().zip(results) {
        match result {
            Ok(true) => report.activated.push(anchor.id.clone()),
            Ok(false) => {}
            Err(e) => {
                warn!(anchor_id = %anchor.id, owner_id = anchor.owner_id, error = %e, "Take-profit activation failed");
                report.failed.push((anchor.id.clone(), e.to_string()));
            }
        }
    }

    let exits = ctx
        .positions
        .query(&PositionFilter::open().kind(PositionKind::Tp).filled(false))
        .await?;

    let results = join_all(exits.iter().map(|tp| ratchet(ctx, tp, now))).await;
    for (tp, result) in exits.iter().zip(results) {
        match result {
            Ok(true) => report.ratcheted.push(tp.id.clone()),
            Ok(false) => {}
            Err(e) => {
                warn!(tp_id = %tp.id, owner_id = tp.owner_id, error = %e, "Take-profit ratchet failed");
                report.failed.push((tp.id.clone(), e.to_string()));
            }
        }
    }

    if !report.activated.is_empty() || !report.ratcheted.is_empty() {
        info!(
            activated = report.activated.len(),
            ratcheted = report.ratcheted.len(),
            failed = report.failed.len(),
            "Take-profit cycle complete"
        );
    }
    Ok(report)
}

/// Open the take-profit of one anchor if its activation price is reached.
///
/// The anchor is re-read under its lock, so concurrent calls for the same
/// anchor open at most one take-profit. Children are checked before the
/// anchor is read: an averaging record merged in between is then already
/// reflected in the anchor.
pub async fn activate(
    ctx: &EngineContext,
    anchor_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, TradeError> {
    let _guard = ctx.locks.lock(anchor_id).await;

    if ctx.has_unresolved_child(anchor_id).await? {
        debug!(anchor_id, "Averaging in flight, deferring take-profit");
        return Ok(false);
    }
    let Some(anchor) = ctx.positions.get(anchor_id).await? else {
        return Ok(false);
    };
    if !anchor.is_active_anchor() {
        return Ok(false);
    }
    let Some(user) = ctx.users.get_user(anchor.owner_id).await? else {
        return Ok(false);
    };

    let class = anchor.instrument_class;
    let price = ctx.price(class, &anchor.symbol, now)?;
    if !activation_reached(anchor.side, anchor.avg_price, price, user.tp_activation_pct) {
        return Ok(false);
    }

    let spec = ctx.spec(class, &anchor.symbol)?;
    let account = ctx.account(&user, anchor.venue)?;
    let trigger = trailing_trigger(anchor.side, price, user.tp_trail_pct, spec.price_tick);

    match class {
        InstrumentClass::Linear => {
            let distance = (price - trigger).abs();
            match ctx
                .exchange
                .set_trailing_stop(&account, &anchor.symbol, distance)
                .await
            {
                Ok(()) => {}
                Err(ExchangeError::NoPosition) => {
                    debug!(anchor_id = %anchor.id, "Position already closed on exchange");
                }
                Err(e) => return Err(e.into()),
            }
            ctx.positions
                .update(&anchor.id, PositionPatch::tp_opened(trigger))
                .await?;
        }
        InstrumentClass::Spot => {
            let qty = floor_to_step(anchor.net_qty(), spec.qty_step).min(spec.max_qty);
            if qty.is_zero() || qty < spec.min_qty {
                return Err(TradeError::InsufficientBudget(format!(
                    "exit quantity {qty} below minimum {}",
                    spec.min_qty
                )));
            }

            // Claimed before placement; only a rejected placement releases it.
            ctx.positions
                .update(&anchor.id, PositionPatch::tp_opened(trigger))
                .await?;

            let exit_side = anchor.side.opposite();
            let order = OrderRequest::market(
                class,
                &anchor.symbol,
                exit_side,
                qty,
                generate_client_order_id(anchor.owner_id, anchor.venue, class),
            )
            .triggered_at(trigger, exit_direction(exit_side));
            let ack = match ctx.exchange.place_order(&account, &order).await {
                Ok(ack) => ack,
                Err(e) => {
                    ctx.positions
                        .update(&anchor.id, PositionPatch::tp_cleared())
                        .await?;
                    return Err(e.into());
                }
            };

            let tp = Position::submitted(
                ack.order_link_id.clone(),
                anchor.owner_id,
                PositionKind::Tp,
                anchor.venue,
                class,
                anchor.symbol.clone(),
                exit_side,
                qty,
                now,
            )
            .with_trigger(trigger)
            .depending_on(&anchor.id);
            if let Err(e) = ctx.positions.upsert(tp).await {
                error!(
                    anchor_id = %anchor.id,
                    order_link_id = %ack.order_link_id,
                    error = %e,
                    "Exit order placed but not recorded"
                );
            }
        }
    }

    ctx.metrics.inc_tp_activated();
    info!(
        anchor_id = %anchor.id,
        owner_id = anchor.owner_id,
        symbol = %anchor.symbol,
        class = %class,
        avg_price = %anchor.avg_price,
        %price,
        %trigger,
        "Take-profit opened"
    );
    Ok(true)
}

/// Move a spot exit's trigger toward the price. Never loosens.
async fn ratchet(
    ctx: &EngineContext,
    tp: &Position,
    now: DateTime<Utc>,
) -> Result<bool, TradeError> {
    let Some(current) = tp.trigger_price else {
        return Ok(false);
    };
    let Some(user) = ctx.users.get_user(tp.owner_id).await? else {
        return Ok(false);
    };

    let class = tp.instrument_class;
    let price = ctx.price(class, &tp.symbol, now)?;
    let spec = ctx.spec(class, &tp.symbol)?;
    let candidate = trailing_trigger(tp.side.opposite(), price, user.tp_trail_pct, spec.price_tick);
    if !is_tighter(tp.side, candidate, current) {
        return Ok(false);
    }

    let account = ctx.account(&user, tp.venue)?;
    ctx.exchange
        .amend_order(
            &account,
            &AmendRequest {
                class,
                symbol: tp.symbol.clone(),
                order_link_id: tp.id.clone(),
                trigger_price: candidate,
            },
        )
        .await?;
    ctx.positions
        .update(&tp.id, PositionPatch::trigger(candidate))
        .await?;

    ctx.metrics.inc_tp_ratcheted();
    debug!(tp_id = %tp.id, from = %current, to = %candidate, "Take-profit trigger ratcheted");
    Ok(true)
}
