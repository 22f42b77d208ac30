//! Engine tuning knobs.

use rust_decimal::Decimal;
use std::collections::HashSet;
use std::time::Duration;

/// Configuration shared by every engine component.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Unfilled entry orders older than this are cancelled and finished.
    /// Default: 300 minutes.
    pub stale_order_after: chrono::Duration,
    /// Unfilled records the exchange lists neither as open nor as filled
    /// are finished once they are older than this. Default: 1 minute.
    pub vanished_grace: chrono::Duration,
    /// Price snapshots older than this are not traded on. Default: 30 seconds.
    pub max_price_age: chrono::Duration,
    /// How long a coin counts as a new listing after it first shows up.
    /// Default: 180 days.
    pub new_listing_window: chrono::Duration,
    /// Fee charged on adopted orphan positions, as a fraction of size.
    /// Default: 0.001.
    pub orphan_fee_rate: Decimal,
    /// Channels whose signals go to the DCA engine instead of the dispatcher.
    pub averaging_channels: HashSet<i64>,
    pub price_refresh_interval: Duration,
    pub catalog_refresh_interval: Duration,
    pub reconcile_interval: Duration,
    pub take_profit_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_order_after: chrono::Duration::minutes(300),
            vanished_grace: chrono::Duration::minutes(1),
            max_price_age: chrono::Duration::seconds(30),
            new_listing_window: chrono::Duration::days(180),
            orphan_fee_rate: Decimal::new(1, 3),
            averaging_channels: HashSet::new(),
            price_refresh_interval: Duration::from_secs(5),
            catalog_refresh_interval: Duration::from_secs(24 * 60 * 60),
            reconcile_interval: Duration::from_secs(10),
            take_profit_interval: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn with_stale_order_minutes(mut self, minutes: i64) -> Self {
        self.stale_order_after = chrono::Duration::minutes(minutes);
        self
    }

    pub fn with_max_price_age(mut self, age: Duration) -> Self {
        self.max_price_age = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX);
        self
    }

    pub fn with_vanished_grace(mut self, grace: chrono::Duration) -> Self {
        self.vanished_grace = grace;
        self
    }

    pub fn with_averaging_channels(mut self, channels: impl IntoIterator<Item = i64>) -> Self {
        self.averaging_channels = channels.into_iter().collect();
        self
    }

    pub fn with_price_refresh_interval(mut self, interval: Duration) -> Self {
        self.price_refresh_interval = interval;
        self
    }

    pub fn with_catalog_refresh_interval(mut self, interval: Duration) -> Self {
        self.catalog_refresh_interval = interval;
        self
    }

    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    pub fn with_take_profit_interval(mut self, interval: Duration) -> Self {
        self.take_profit_interval = interval;
        self
    }

    pub fn is_averaging_channel(&self, channel: i64) -> bool {
        self.averaging_channels.contains(&channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.stale_order_after.num_minutes(), 300);
        assert_eq!(config.new_listing_window.num_days(), 180);
        assert_eq!(config.orphan_fee_rate, dec!(0.001));
        assert_eq!(config.vanished_grace.num_minutes(), 1);
        assert_eq!(config.max_price_age.num_seconds(), 30);
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_stale_order_minutes(60)
            .with_averaging_channels([-100, -200])
            .with_max_price_age(Duration::from_secs(12));

        assert_eq!(config.stale_order_after.num_minutes(), 60);
        assert!(config.is_averaging_channel(-200));
        assert!(!config.is_averaging_channel(1));
        assert_eq!(config.max_price_age.num_seconds(), 12);
    }
}
