//! Handles shared by every engine component.

use crate::catalog::InstrumentCatalog;
use crate::config::EngineConfig;
use crate::error::TradeError;
use crate::locks::AnchorLocks;
use crate::price_cache::PriceReader;
use execution_core::{Account, SharedExchangeClient};
use metrics::SharedMetrics;
use chrono::{DateTime, Utc};
use model::{InstrumentClass, InstrumentSpec, Position, User, Venue};
use position_store::{PositionFilter, PositionPatch, SharedPositionStore, SharedUserStore};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Everything a component needs, passed explicitly. Cheap to clone.
#[derive(Clone)]
pub struct EngineContext {
    pub exchange: SharedExchangeClient,
    pub positions: SharedPositionStore,
    pub users: SharedUserStore,
    pub catalog: Arc<InstrumentCatalog>,
    pub prices: PriceReader,
    pub locks: Arc<AnchorLocks>,
    pub metrics: SharedMetrics,
    pub config: Arc<EngineConfig>,
}

impl EngineContext {
    pub fn new(
        exchange: SharedExchangeClient,
        positions: SharedPositionStore,
        users: SharedUserStore,
        prices: PriceReader,
        metrics: SharedMetrics,
        config: EngineConfig,
    ) -> Self {
        Self {
            exchange,
            positions,
            users,
            catalog: Arc::new(InstrumentCatalog::new(config.new_listing_window)),
            prices,
            locks: Arc::new(AnchorLocks::new()),
            metrics,
            config: Arc::new(config),
        }
    }

    /// The account a user trades on at `venue`.
    pub fn account(&self, user: &User, venue: Venue) -> Result<Account, TradeError> {
        user.credentials(venue)
            .map(|creds| Account::new(user.id, venue, creds.clone()))
            .ok_or(TradeError::CredentialsMissing {
                owner_id: user.id,
                venue,
            })
    }

    /// Latest price of a symbol, provided the snapshot is recent enough.
    pub fn price(
        &self,
        class: InstrumentClass,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<Decimal, TradeError> {
        let snapshot = self.prices.latest();
        if !snapshot.is_fresh(now, self.config.max_price_age) {
            return Err(TradeError::StalePrice {
                class,
                symbol: symbol.to_string(),
                captured_at: snapshot.captured_at,
            });
        }
        snapshot
            .price(class, symbol)
            .ok_or_else(|| TradeError::missing_price(class, symbol))
    }

    /// Whether the latest snapshot may be traded on at `now`.
    pub fn prices_fresh(&self, now: DateTime<Utc>) -> bool {
        self.prices.latest().is_fresh(now, self.config.max_price_age)
    }

    pub fn spec(&self, class: InstrumentClass, symbol: &str) -> Result<InstrumentSpec, TradeError> {
        self.catalog
            .spec(class, symbol)
            .ok_or_else(|| TradeError::missing_instrument(class, symbol))
    }

    /// Whether the anchor still has an averaging or tp record in flight.
    pub async fn has_unresolved_child(&self, anchor_id: &str) -> Result<bool, TradeError> {
        let children = self
            .positions
            .query(&PositionFilter::open().depends_on(anchor_id))
            .await?;
        Ok(children.iter().any(Position::is_unresolved_child))
    }

    /// Finish every unresolved child of an anchor, then the anchor itself.
    ///
    /// Returns the number of records finished.
    pub async fn finish_with_children(&self, anchor_id: &str) -> Result<usize, TradeError> {
        let children = self
            .positions
            .query(&PositionFilter::open().depends_on(anchor_id))
            .await?;

        let mut finished = 0;
        for child in &children {
            self.positions.update(&child.id, PositionPatch::finished()).await?;
            finished += 1;
        }

        let anchor = self.positions.update(anchor_id, PositionPatch::finished()).await?;
        finished += 1;

        debug!(
            anchor_id = %anchor.id,
            owner_id = anchor.owner_id,
            children = children.len(),
            "Anchor finished"
        );
        Ok(finished)
    }
}
