//! Reconciliation Loop.
//!
//! The exchange is the source of truth. Each cycle walks every account with
//! credentials and brings the local records in line:
//!
//! 1. orders: unfilled records the exchange reports as filled get their
//!    execution facts; records it lists neither as open nor as filled are
//!    finished once past a short grace period
//! 2. children: filled averaging records are merged into their anchor,
//!    filled tp records close their anchor
//! 3. positions (linear): exchange positions without a local anchor are
//!    adopted, local anchors without an exchange position are finished
//! 4. stale entries: unfilled entry orders past the cutoff are cancelled
//!    and finished
//!
//! The checks run independently; one failing listing does not hold back
//! the others. Running a cycle twice against unchanged exchange state
//! changes nothing the second time.

use crate::context::EngineContext;
use crate::error::TradeError;
use chrono::{DateTime, Utc};
use execution_core::{generate_client_order_id, Account, ExchangePosition, FilledOrder};
use futures_util::future::join_all;
use model::{InstrumentClass, Position, PositionKind, User, Venue};
use position_store::{PositionFilter, PositionPatch};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// One check the cycle could not complete for an account.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountFailure {
    pub owner_id: i64,
    pub venue: Venue,
    pub check: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub accounts: usize,
    /// Records that received execution facts.
    pub fills: usize,
    /// Averaging records folded into their anchor.
    pub merged: usize,
    /// Anchors finished by a tp fill or by closure on the exchange.
    pub closed: usize,
    /// Exchange positions adopted as local anchors.
    pub adopted: usize,
    /// Unfilled orders cancelled for age.
    pub stale: usize,
    /// Unfilled records the exchange no longer knows about.
    pub vanished: usize,
    pub failed: Vec<AccountFailure>,
}

impl ReconcileReport {
    fn absorb(&mut self, other: ReconcileReport) {
        self.fills += other.fills;
        self.merged += other.merged;
        self.closed += other.closed;
        self.adopted += other.adopted;
        self.stale += other.stale;
        self.vanished += other.vanished;
        self.failed.extend(other.failed);
    }

    /// Whether the cycle changed any record.
    pub fn changed(&self) -> bool {
        self.fills + self.merged + self.closed + self.adopted + self.stale + self.vanished > 0
    }

    fn record(&mut self, account: &Account, check: &'static str, result: Result<(), TradeError>) {
        if let Err(e) = result {
            warn!(
                owner_id = account.owner_id,
                venue = %account.venue,
                check,
                error = %e,
                "Reconciliation check failed"
            );
            self.failed.push(AccountFailure {
                owner_id: account.owner_id,
                venue: account.venue,
                check,
                reason: e.to_string(),
            });
        }
    }
}

/// Reconcile every (user, venue) pair that has credentials.
pub async fn run_cycle(ctx: &EngineContext, now: DateTime<Utc>) -> Result<ReconcileReport, TradeError> {
    let users = ctx.users.all_users().await?;

    let accounts: Vec<(&User, Account)> = users
        .iter()
        .flat_map(|user| {
            Venue::ALL
                .into_iter()
                .filter_map(move |venue| ctx.account(user, venue).ok().map(|a| (user, a)))
        })
        .collect();

    let results = join_all(
        accounts
            .iter()
            .map(|(user, account)| reconcile_account(ctx, user, account, now)),
    )
    .await;

    let mut report = ReconcileReport {
        accounts: accounts.len(),
        ..ReconcileReport::default()
    };
    for account_report in results {
        report.absorb(account_report);
    }

    ctx.metrics.inc_reconcile_cycles();
    ctx.metrics.add_fills_detected(report.fills as u64);
    ctx.metrics.add_averaging_merged(report.merged as u64);
    ctx.metrics.add_orphans_adopted(report.adopted as u64);
    ctx.metrics.add_stale_cancelled(report.stale as u64);

    if report.changed() {
        info!(
            accounts = report.accounts,
            fills = report.fills,
            merged = report.merged,
            closed = report.closed,
            adopted = report.adopted,
            stale = report.stale,
            vanished = report.vanished,
            failed = report.failed.len(),
            "Reconciliation cycle complete"
        );
    } else {
        debug!(accounts = report.accounts, failed = report.failed.len(), "Reconciliation cycle complete");
    }
    Ok(report)
}

async fn reconcile_account(
    ctx: &EngineContext,
    user: &User,
    account: &Account,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let scope = PositionFilter::open().owner(account.owner_id).venue(account.venue);

    for class in InstrumentClass::ALL {
        let result = sync_orders(ctx, account, &scope, class, now, &mut report).await;
        let check = match class {
            InstrumentClass::Spot => "spot orders",
            InstrumentClass::Linear => "linear orders",
        };
        report.record(account, check, result);
    }

    let result = resolve_filled_children(ctx, &scope, &mut report).await;
    report.record(account, "children", result);

    let result = sync_positions(ctx, user, account, &scope, now, &mut report).await;
    report.record(account, "positions", result);

    let result = sweep_stale(ctx, account, &scope, now, &mut report).await;
    report.record(account, "stale orders", result);

    report
}

/// Match the unfilled records of one class against the exchange's order
/// listings.
///
/// Open orders are listed before filled ones: an order that fills between
/// the two requests then shows up as filled rather than as gone.
async fn sync_orders(
    ctx: &EngineContext,
    account: &Account,
    scope: &PositionFilter,
    class: InstrumentClass,
    now: DateTime<Utc>,
    report: &mut ReconcileReport,
) -> Result<(), TradeError> {
    let unfilled = ctx
        .positions
        .query(&scope.clone().class(class).filled(false))
        .await?;
    if unfilled.is_empty() {
        return Ok(());
    }

    let open = ctx.exchange.get_open_orders(account, class).await?;
    let filled = ctx.exchange.get_filled_orders(account, class).await?;
    let open_ids: HashSet<&str> = open.iter().map(|o| o.order_link_id.as_str()).collect();
    let by_id: HashMap<&str, &FilledOrder> =
        filled.iter().map(|f| (f.order_link_id.as_str(), f)).collect();

    for record in &unfilled {
        if let Some(fill) = by_id.get(record.id.as_str()) {
            ctx.positions
                .update(
                    &record.id,
                    PositionPatch::fill(
                        fill.avg_price,
                        fill.cum_exec_qty,
                        fill.cum_exec_value,
                        fill.cum_exec_fee,
                    ),
                )
                .await?;
            report.fills += 1;
            info!(
                id = %record.id,
                owner_id = record.owner_id,
                kind = %record.kind,
                symbol = %record.symbol,
                avg_price = %fill.avg_price,
                qty = %fill.cum_exec_qty,
                "Fill detected"
            );
            continue;
        }

        if open_ids.contains(record.id.as_str())
            || now - record.created_at < ctx.config.vanished_grace
        {
            continue;
        }
        if finish_vanished(ctx, record).await? {
            report.vanished += 1;
        }
    }
    Ok(())
}

/// Finish a record the exchange lists neither as open nor as filled.
///
/// A vanished tp also releases its anchor so a new exit can be opened.
async fn finish_vanished(ctx: &EngineContext, record: &Position) -> Result<bool, TradeError> {
    let anchor_id = record.depends_on.as_deref().unwrap_or(&record.id);
    let _guard = ctx.locks.lock(anchor_id).await;

    let Some(current) = ctx.positions.get(&record.id).await? else {
        return Ok(false);
    };
    if current.filled || current.finished {
        return Ok(false);
    }

    match current.kind {
        PositionKind::Main => {
            ctx.finish_with_children(&current.id).await?;
        }
        PositionKind::Averaging => {
            ctx.positions.update(&current.id, PositionPatch::finished()).await?;
        }
        PositionKind::Tp => {
            ctx.positions.update(&current.id, PositionPatch::finished()).await?;
            let anchor = ctx
                .positions
                .get(anchor_id)
                .await?
                .filter(Position::is_open_anchor);
            if let Some(anchor) = anchor {
                ctx.positions
                    .update(&anchor.id, PositionPatch::tp_cleared())
                    .await?;
            }
        }
    }

    warn!(
        id = %current.id,
        owner_id = current.owner_id,
        kind = %current.kind,
        symbol = %current.symbol,
        "Order no longer on exchange, record finished"
    );
    Ok(true)
}

/// Merge filled averaging records and close anchors whose tp filled.
///
/// Also picks up records filled in an earlier cycle that was interrupted
/// before resolving them.
async fn resolve_filled_children(
    ctx: &EngineContext,
    scope: &PositionFilter,
    report: &mut ReconcileReport,
) -> Result<(), TradeError> {
    let children: Vec<Position> = ctx
        .positions
        .query(&scope.clone().filled(true))
        .await?
        .into_iter()
        .filter(|p| p.kind != PositionKind::Main)
        .collect();

    for child in children {
        let Some(anchor_id) = child.depends_on.clone() else {
            ctx.positions.update(&child.id, PositionPatch::finished()).await?;
            continue;
        };

        let _guard = ctx.locks.lock(&anchor_id).await;
        let anchor = ctx
            .positions
            .get(&anchor_id)
            .await?
            .filter(Position::is_open_anchor);

        match (child.kind, anchor) {
            (PositionKind::Averaging, Some(anchor)) => {
                let merged = ctx.positions.merge_averaging(&anchor.id, &child.id).await?;
                report.merged += 1;
                info!(
                    anchor_id = %merged.id,
                    averaging_id = %child.id,
                    avg_price = %merged.avg_price,
                    qty = %merged.cum_exec_qty,
                    "Averaging merged"
                );
            }
            (PositionKind::Tp, Some(anchor)) => {
                ctx.positions.update(&child.id, PositionPatch::finished()).await?;
                ctx.finish_with_children(&anchor.id).await?;
                report.closed += 1;
                info!(anchor_id = %anchor.id, tp_id = %child.id, "Take-profit filled, position closed");
            }
            _ => {
                debug!(id = %child.id, anchor_id = %anchor_id, "Anchor gone, finishing child");
                ctx.positions.update(&child.id, PositionPatch::finished()).await?;
            }
        }
    }
    Ok(())
}

/// Adopt orphan linear positions and finish anchors closed on the exchange.
async fn sync_positions(
    ctx: &EngineContext,
    user: &User,
    account: &Account,
    scope: &PositionFilter,
    now: DateTime<Utc>,
    report: &mut ReconcileReport,
) -> Result<(), TradeError> {
    let linear_mains = ctx
        .positions
        .query(&scope.clone().class(InstrumentClass::Linear).kind(PositionKind::Main))
        .await?;
    if !user.linear_enabled && linear_mains.is_empty() {
        return Ok(());
    }

    let exchange_positions = ctx.exchange.get_positions(account).await?;
    adopt_orphans(ctx, account, &linear_mains, &exchange_positions, now, report).await?;
    finish_closed(ctx, &linear_mains, &exchange_positions, report).await
}

fn holds(main: &Position, position: &ExchangePosition) -> bool {
    main.symbol == position.symbol && main.side == position.side
}

/// A filled anchor synthesized from an exchange position.
fn adopted_anchor(
    account: &Account,
    position: &ExchangePosition,
    fee_rate: Decimal,
    now: DateTime<Utc>,
) -> Position {
    let mut anchor = Position::submitted(
        generate_client_order_id(account.owner_id, account.venue, InstrumentClass::Linear),
        account.owner_id,
        PositionKind::Main,
        account.venue,
        InstrumentClass::Linear,
        position.symbol.clone(),
        position.side,
        position.size,
        now,
    );
    anchor.avg_price = position.avg_price;
    anchor.cum_exec_qty = position.size;
    anchor.cum_exec_value = if position.position_value.is_zero() {
        position.avg_price * position.size
    } else {
        position.position_value
    };
    anchor.cum_exec_fee = position.size * fee_rate;
    anchor.filled = true;
    anchor
}

async fn adopt_orphans(
    ctx: &EngineContext,
    account: &Account,
    linear_mains: &[Position],
    exchange_positions: &[ExchangePosition],
    now: DateTime<Utc>,
    report: &mut ReconcileReport,
) -> Result<(), TradeError> {
    for position in exchange_positions {
        if linear_mains.iter().any(|m| holds(m, position)) {
            continue;
        }

        let anchor = adopted_anchor(account, position, ctx.config.orphan_fee_rate, now);
        info!(
            id = %anchor.id,
            owner_id = account.owner_id,
            symbol = %position.symbol,
            side = %position.side,
            size = %position.size,
            "Adopting orphan exchange position"
        );
        ctx.positions.upsert(anchor).await?;
        report.adopted += 1;
    }
    Ok(())
}

async fn finish_closed(
    ctx: &EngineContext,
    linear_mains: &[Position],
    exchange_positions: &[ExchangePosition],
    report: &mut ReconcileReport,
) -> Result<(), TradeError> {
    for main in linear_mains {
        let on_exchange = exchange_positions.iter().any(|p| holds(main, p));
        if on_exchange {
            continue;
        }

        let _guard = ctx.locks.lock(&main.id).await;
        // The fill may have been recorded earlier in this cycle.
        let Some(current) = ctx.positions.get(&main.id).await? else {
            continue;
        };
        if !current.filled || current.finished {
            continue;
        }

        ctx.finish_with_children(&current.id).await?;
        report.closed += 1;
        info!(anchor_id = %current.id, owner_id = current.owner_id, symbol = %current.symbol, "Position closed on exchange");
    }
    Ok(())
}

/// Cancel and finish unfilled entry orders older than the configured age.
///
/// Tp records are kept; their trigger is maintained by the take-profit
/// engine for as long as the anchor lives.
async fn sweep_stale(
    ctx: &EngineContext,
    account: &Account,
    scope: &PositionFilter,
    now: DateTime<Utc>,
    report: &mut ReconcileReport,
) -> Result<(), TradeError> {
    let cutoff = now - ctx.config.stale_order_after;
    let stale: Vec<Position> = ctx
        .positions
        .query(&scope.clone().filled(false))
        .await?
        .into_iter()
        .filter(|p| p.kind != PositionKind::Tp && p.created_at < cutoff)
        .collect();

    for record in stale {
        let err = TradeError::StaleOrder(record.id.clone());
        if let Err(e) = ctx
            .exchange
            .cancel_order(account, record.instrument_class, &record.symbol, &record.id)
            .await
        {
            debug!(id = %record.id, error = %e, "Cancel of stale order failed, finishing anyway");
        }

        match record.kind {
            PositionKind::Main => {
                ctx.finish_with_children(&record.id).await?;
            }
            _ => {
                ctx.positions.update(&record.id, PositionPatch::finished()).await?;
            }
        }
        report.stale += 1;
        info!(
            id = %record.id,
            owner_id = record.owner_id,
            symbol = %record.symbol,
            age_minutes = (now - record.created_at).num_minutes(),
            "{err}"
        );
    }
    Ok(())
}
