//! User-initiated close-all and credential verification.

use crate::context::EngineContext;
use crate::error::TradeError;
use execution_core::sizing::floor_to_step;
use execution_core::{generate_client_order_id, ExchangeError, OrderRequest};
use model::{InstrumentClass, Position, PositionKind, User, Venue};
use position_store::{PositionFilter, PositionPatch};
use rust_decimal::Decimal;
use tracing::{info, warn};

/// A record close-all could not unwind on the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseFailure {
    pub position_id: String,
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CloseReport {
    /// Unfilled orders cancelled.
    pub cancelled: Vec<String>,
    /// Anchors closed with a market order.
    pub closed: Vec<String>,
    /// Records marked finished.
    pub finished: usize,
    pub failures: Vec<CloseFailure>,
}

impl CloseReport {
    fn fail(&mut self, position: &Position, reason: impl ToString) {
        self.failures.push(CloseFailure {
            position_id: position.id.clone(),
            symbol: position.symbol.clone(),
            reason: reason.to_string(),
        });
    }
}

/// Exit order for a filled anchor.
fn closing_order(ctx: &EngineContext, anchor: &Position) -> Result<OrderRequest, TradeError> {
    let class = anchor.instrument_class;
    let exit_side = anchor.side.opposite();
    let id = generate_client_order_id(anchor.owner_id, anchor.venue, class);

    match class {
        InstrumentClass::Linear => Ok(OrderRequest::market(
            class,
            &anchor.symbol,
            exit_side,
            anchor.cum_exec_qty,
            id,
        )
        .reduce_only()),
        InstrumentClass::Spot => {
            let spec = ctx.spec(class, &anchor.symbol)?;
            let qty = floor_to_step(anchor.net_qty(), spec.qty_step).min(spec.max_qty);
            if qty.is_zero() || qty < spec.min_qty {
                return Err(TradeError::InsufficientBudget(format!(
                    "close quantity {qty} below minimum {}",
                    spec.min_qty
                )));
            }
            Ok(OrderRequest::market(class, &anchor.symbol, exit_side, qty, id))
        }
    }
}

/// Cancel every working order and market-close every filled position of
/// one user on one venue, then finish all of their records.
///
/// Exchange failures do not stop the sweep; they are returned per position.
pub async fn close_all(
    ctx: &EngineContext,
    owner_id: i64,
    venue: Venue,
) -> Result<CloseReport, TradeError> {
    let user = ctx
        .users
        .get_user(owner_id)
        .await?
        .ok_or(TradeError::CredentialsMissing { owner_id, venue })?;
    let account = ctx.account(&user, venue)?;

    let open = ctx
        .positions
        .query(&PositionFilter::open().owner(owner_id).venue(venue))
        .await?;

    let mut report = CloseReport::default();

    for record in open.iter().filter(|p| !p.filled) {
        match ctx
            .exchange
            .cancel_order(&account, record.instrument_class, &record.symbol, &record.id)
            .await
        {
            Ok(()) => report.cancelled.push(record.id.clone()),
            Err(e) => {
                warn!(id = %record.id, owner_id, error = %e, "Cancel failed during close-all");
                report.fail(record, e);
            }
        }
    }

    for anchor in open.iter().filter(|p| p.kind == PositionKind::Main && p.filled) {
        let result = match closing_order(ctx, anchor) {
            Ok(order) => ctx
                .exchange
                .place_order(&account, &order)
                .await
                .map(|_| ())
                .map_err(TradeError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => report.closed.push(anchor.id.clone()),
            Err(e) => {
                warn!(anchor_id = %anchor.id, owner_id, symbol = %anchor.symbol, error = %e, "Could not close position");
                report.fail(anchor, e);
            }
        }
    }

    for record in &open {
        ctx.positions
            .update(&record.id, PositionPatch::finished())
            .await?;
        report.finished += 1;
    }

    info!(
        owner_id,
        venue = %venue,
        cancelled = report.cancelled.len(),
        closed = report.closed.len(),
        failures = report.failures.len(),
        "Close-all complete"
    );
    Ok(report)
}

/// Result of probing a user's API key.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialCheck {
    Valid { balance: Decimal },
    Missing,
    /// The exchange refused the key.
    Invalid(String),
    /// The exchange could not be reached; the key may still be good.
    Unreachable(String),
}

impl CredentialCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, CredentialCheck::Valid { .. })
    }
}

/// Check the user's credentials for `venue` with a balance request.
pub async fn verify_credentials(ctx: &EngineContext, user: &User, venue: Venue) -> CredentialCheck {
    let account = match ctx.account(user, venue) {
        Ok(account) => account,
        Err(_) => return CredentialCheck::Missing,
    };

    match ctx.exchange.get_balance(&account).await {
        Ok(balance) => CredentialCheck::Valid { balance },
        Err(ExchangeError::Transient(msg)) => CredentialCheck::Unreachable(msg),
        Err(e) => {
            warn!(owner_id = user.id, venue = %venue, error = %e, "Credential check failed");
            CredentialCheck::Invalid(e.to_string())
        }
    }
}
