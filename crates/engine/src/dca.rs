//! DCA Engine: enlarge filled positions on adverse moves.
//!
//! Triggered by signals from averaging channels. The order placed here only
//! creates an `averaging` record; folding it into the anchor happens in the
//! reconciler once the exchange reports the fill.

use crate::context::EngineContext;
use crate::error::TradeError;
use chrono::{DateTime, Utc};
use execution_core::sizing::{floor_to_step, shift_by_pct};
use execution_core::{generate_client_order_id, OrderRequest};
use futures_util::future::join_all;
use model::{symbol_for_coin, InstrumentSpec, Position, PositionKind, Side, Signal};
use position_store::PositionFilter;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// What happened to one anchor.
#[derive(Debug, Clone, PartialEq)]
pub enum AveragingOutcome {
    /// Client order id of the averaging order.
    Placed(String),
    /// Price has not moved far enough against the position.
    NotTriggered,
    /// A previous averaging or tp order is still unresolved.
    Pending,
    /// The owner turned averaging off or paused trading.
    Disabled,
    /// The anchor was finished or tp'd in the meantime.
    Gone,
}

#[derive(Debug, Clone, Default)]
pub struct DcaReport {
    pub symbol: String,
    pub outcomes: Vec<(String, AveragingOutcome)>,
    /// Anchor id and the error that stopped it.
    pub failed: Vec<(String, String)>,
}

impl DcaReport {
    pub fn placed(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter_map(|(_, o)| match o {
            AveragingOutcome::Placed(id) => Some(id.as_str()),
            _ => None,
        })
    }
}

/// Whether `price` moved at least `step_pct` against the anchor.
pub fn is_adverse_move(side: Side, avg_price: Decimal, price: Decimal, step_pct: Decimal) -> bool {
    match side {
        Side::Buy => price <= shift_by_pct(avg_price, -step_pct),
        Side::Sell => price >= shift_by_pct(avg_price, step_pct),
    }
}

/// Quantity added to a position of `prev` base units.
///
/// Starts from `|prev * multiplier - prev|` and is cut so the enlarged
/// position stays within `max_trade` at `price` and the order costs no more
/// than `budget`.
pub fn averaging_qty(
    prev: Decimal,
    multiplier: Decimal,
    max_trade: Decimal,
    budget: Decimal,
    price: Decimal,
    spec: &InstrumentSpec,
) -> Result<Decimal, TradeError> {
    if price <= Decimal::ZERO {
        return Err(TradeError::InsufficientBudget(format!("unusable price {price}")));
    }

    let wanted = (prev * multiplier - prev).abs();
    let headroom = floor_to_step(max_trade / price, spec.qty_step) - prev;
    let affordable = budget / price;

    let extra = wanted.min(headroom).min(affordable).max(Decimal::ZERO);
    let extra = floor_to_step(extra, spec.qty_step).min(spec.max_qty);

    if extra.is_zero() || extra < spec.min_qty {
        return Err(TradeError::InsufficientBudget(format!(
            "averaging quantity {extra} below minimum {}",
            spec.min_qty
        )));
    }
    Ok(extra)
}

/// Average every eligible anchor on the signal's symbol.
pub async fn average(
    ctx: &EngineContext,
    signal: &Signal,
    now: DateTime<Utc>,
) -> Result<DcaReport, TradeError> {
    let symbol = symbol_for_coin(&signal.coin);
    ctx.metrics.inc_signals_received();

    let anchors: Vec<Position> = ctx
        .positions
        .query(
            &PositionFilter::open()
                .kind(PositionKind::Main)
                .symbol(&symbol)
                .filled(true)
                .tp_opened(false),
        )
        .await?
        .into_iter()
        .filter(|a| a.side == signal.direction)
        .collect();

    let results = join_all(anchors.iter().map(|a| average_anchor(ctx, &a.id, now))).await;

    let mut report = DcaReport {
        symbol: symbol.clone(),
        ..DcaReport::default()
    };
    for (anchor, result) in anchors.iter().zip(results) {
        match result {
            Ok(outcome) => report.outcomes.push((anchor.id.clone(), outcome)),
            Err(e) => {
                debug!(anchor_id = %anchor.id, owner_id = anchor.owner_id, error = %e, "Averaging skipped");
                report.failed.push((anchor.id.clone(), e.to_string()));
            }
        }
    }

    info!(
        symbol = %symbol,
        anchors = anchors.len(),
        placed = report.placed().count(),
        failed = report.failed.len(),
        "Averaging signal processed"
    );
    Ok(report)
}

async fn average_anchor(
    ctx: &EngineContext,
    anchor_id: &str,
    now: DateTime<Utc>,
) -> Result<AveragingOutcome, TradeError> {
    let _guard = ctx.locks.lock(anchor_id).await;

    if ctx.has_unresolved_child(anchor_id).await? {
        return Ok(AveragingOutcome::Pending);
    }
    let Some(anchor) = ctx.positions.get(anchor_id).await? else {
        return Ok(AveragingOutcome::Gone);
    };
    if !anchor.is_active_anchor() {
        return Ok(AveragingOutcome::Gone);
    }

    let Some(user) = ctx.users.get_user(anchor.owner_id).await? else {
        return Ok(AveragingOutcome::Disabled);
    };
    if !user.averaging_enabled || user.stop_trading {
        return Ok(AveragingOutcome::Disabled);
    }
    let account = ctx.account(&user, anchor.venue)?;

    let class = anchor.instrument_class;
    let price = ctx.price(class, &anchor.symbol, now)?;
    if !is_adverse_move(anchor.side, anchor.avg_price, price, user.averaging_step_pct) {
        return Ok(AveragingOutcome::NotTriggered);
    }
    let spec = ctx.spec(class, &anchor.symbol)?;

    let budget = ctx.exchange.get_balance(&account).await?;
    let qty = averaging_qty(
        anchor.cum_exec_qty,
        user.averaging_multiplier,
        user.max_trade,
        budget,
        price,
        &spec,
    )?;

    let order = OrderRequest::market(
        class,
        &anchor.symbol,
        anchor.side,
        qty,
        generate_client_order_id(anchor.owner_id, anchor.venue, class),
    );
    let ack = match ctx.exchange.place_order(&account, &order).await {
        Ok(ack) => ack,
        Err(e) => {
            warn!(anchor_id = %anchor.id, owner_id = anchor.owner_id, error = %e, "Averaging order rejected");
            ctx.metrics.inc_orders_rejected();
            return Err(e.into());
        }
    };

    let averaging = Position::submitted(
        ack.order_link_id.clone(),
        anchor.owner_id,
        PositionKind::Averaging,
        anchor.venue,
        class,
        anchor.symbol.clone(),
        anchor.side,
        qty,
        now,
    )
    .depending_on(&anchor.id);
    ctx.positions.upsert(averaging).await?;
    ctx.metrics.inc_orders_placed();

    info!(
        anchor_id = %anchor.id,
        owner_id = anchor.owner_id,
        symbol = %anchor.symbol,
        %price,
        avg_price = %anchor.avg_price,
        %qty,
        "Averaging order placed"
    );
    Ok(AveragingOutcome::Placed(ack.order_link_id))
}
