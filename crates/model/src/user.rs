//! End-user trading settings.

use crate::types::{InstrumentClass, Venue};
use auth::ApiCredentials;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeSet;

/// Which coins a user accepts signals for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", content = "coins", rename_all = "snake_case")]
pub enum TradingPairs {
    #[default]
    All,
    /// Only coins listed recently (see the instrument catalog).
    OnlyNew,
    Explicit(BTreeSet<String>),
}

impl TradingPairs {
    pub fn allows(&self, coin: &str, is_new_listing: bool) -> bool {
        match self {
            Self::All => true,
            Self::OnlyNew => is_new_listing,
            Self::Explicit(coins) => coins.contains(&coin.to_uppercase()),
        }
    }
}

/// A user as read by the engine.
///
/// All `*_pct` fields are percentages, so `0.1` means 0.1%.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub demo: Option<ApiCredentials>,
    #[serde(default)]
    pub real: Option<ApiCredentials>,
    #[serde(default = "default_venue")]
    pub trade_venue: Venue,
    #[serde(default)]
    pub spot_enabled: bool,
    #[serde(default)]
    pub linear_enabled: bool,
    pub min_trade: Decimal,
    pub max_trade: Decimal,
    #[serde(default)]
    pub averaging_enabled: bool,
    #[serde(default)]
    pub averaging_step_pct: Decimal,
    #[serde(default = "default_multiplier")]
    pub averaging_multiplier: Decimal,
    #[serde(default)]
    pub tp_activation_pct: Decimal,
    #[serde(default)]
    pub tp_trail_pct: Decimal,
    #[serde(default = "default_leverage")]
    pub leverage: Decimal,
    #[serde(default = "default_leverage")]
    pub max_leverage: Decimal,
    #[serde(default)]
    pub trade_acceptance_slippage_pct: Decimal,
    #[serde(default)]
    pub trading_pairs: TradingPairs,
    #[serde(default)]
    pub stop_trading: bool,
    #[serde(default)]
    pub subscription_expiry: Option<DateTime<Utc>>,
}

fn default_venue() -> Venue {
    Venue::Demo
}

fn default_multiplier() -> Decimal {
    Decimal::TWO
}

fn default_leverage() -> Decimal {
    Decimal::ONE
}

impl User {
    pub fn credentials(&self, venue: Venue) -> Option<&ApiCredentials> {
        match venue {
            Venue::Demo => self.demo.as_ref(),
            Venue::Real => self.real.as_ref(),
        }
    }

    pub fn is_subscribed(&self, now: DateTime<Utc>) -> bool {
        self.subscription_expiry.is_some_and(|expiry| expiry > now)
    }

    /// Subscribed and not paused.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.is_subscribed(now) && !self.stop_trading
    }

    pub fn trades(&self, class: InstrumentClass) -> bool {
        match class {
            InstrumentClass::Spot => self.spot_enabled,
            InstrumentClass::Linear => self.linear_enabled,
        }
    }
}
