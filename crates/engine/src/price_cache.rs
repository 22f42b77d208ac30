//! Latest-price distribution.
//!
//! One publisher replaces the whole snapshot on every refresh; any number of
//! readers see either the previous snapshot or the new one, never a mix.

use chrono::{DateTime, Utc};
use execution_core::SharedExchangeClient;
use metrics::EngineMetrics;
use model::InstrumentClass;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Last prices of both instrument classes captured by one refresh.
#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    pub spot: HashMap<String, Decimal>,
    pub linear: HashMap<String, Decimal>,
    /// `None` until the first successful refresh.
    pub captured_at: Option<DateTime<Utc>>,
}

impl PriceSnapshot {
    pub fn new(
        spot: HashMap<String, Decimal>,
        linear: HashMap<String, Decimal>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            spot,
            linear,
            captured_at: Some(captured_at),
        }
    }

    pub fn price(&self, class: InstrumentClass, symbol: &str) -> Option<Decimal> {
        let prices = match class {
            InstrumentClass::Spot => &self.spot,
            InstrumentClass::Linear => &self.linear,
        };
        prices.get(symbol).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.captured_at.is_none()
    }

    /// Time since capture; `None` before the first refresh.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.captured_at.map(|at| now - at)
    }

    /// Captured no longer than `max_age` before `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.age(now).is_some_and(|age| age <= max_age)
    }
}

/// Write half. Only the price-refresh worker holds one.
#[derive(Debug)]
pub struct PricePublisher {
    tx: watch::Sender<Arc<PriceSnapshot>>,
}

impl PricePublisher {
    pub fn publish(&self, snapshot: PriceSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    pub fn reader(&self) -> PriceReader {
        PriceReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read half, cheap to clone.
#[derive(Debug, Clone)]
pub struct PriceReader {
    rx: watch::Receiver<Arc<PriceSnapshot>>,
}

impl PriceReader {
    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<PriceSnapshot> {
        self.rx.borrow().clone()
    }

    /// Wait until a snapshot newer than the last one seen is published.
    ///
    /// Returns `false` once the publisher is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// An empty cache.
pub fn price_channel() -> (PricePublisher, PriceReader) {
    let (tx, rx) = watch::channel(Arc::new(PriceSnapshot::default()));
    (PricePublisher { tx }, PriceReader { rx })
}

/// Fetch both classes concurrently and publish only if both succeeded.
///
/// Returns whether a new snapshot was published. On failure readers keep
/// the previous snapshot.
pub async fn refresh_prices(
    exchange: &SharedExchangeClient,
    publisher: &PricePublisher,
    metrics: &EngineMetrics,
    now: DateTime<Utc>,
) -> bool {
    let (spot, linear) = tokio::join!(
        exchange.get_tickers(InstrumentClass::Spot),
        exchange.get_tickers(InstrumentClass::Linear),
    );

    match (spot, linear) {
        (Ok(spot), Ok(linear)) => {
            debug!(
                spot = spot.len(),
                linear = linear.len(),
                "Publishing price snapshot"
            );
            publisher.publish(PriceSnapshot::new(spot, linear, now));
            metrics.inc_price_refreshes();
            true
        }
        (spot, linear) => {
            if let Err(e) = spot {
                warn!(error = %e, "Spot ticker refresh failed");
            }
            if let Err(e) = linear {
                warn!(error = %e, "Linear ticker refresh failed");
            }
            metrics.inc_price_refresh_failures();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockExchange;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_until_published() {
        let (publisher, reader) = price_channel();
        assert!(reader.latest().is_empty());

        let spot = HashMap::from([("SOLUSDT".to_string(), dec!(140))]);
        publisher.publish(PriceSnapshot::new(spot, HashMap::new(), Utc::now()));

        let snapshot = reader.latest();
        assert!(!snapshot.is_empty());
        assert_eq!(snapshot.price(InstrumentClass::Spot, "SOLUSDT"), Some(dec!(140)));
        assert_eq!(snapshot.price(InstrumentClass::Linear, "SOLUSDT"), None);
    }

    #[test]
    fn test_old_snapshot_survives_replacement() {
        let (publisher, reader) = price_channel();
        let spot = HashMap::from([("BTCUSDT".to_string(), dec!(1))]);
        publisher.publish(PriceSnapshot::new(spot, HashMap::new(), Utc::now()));
        let held = reader.latest();

        let spot = HashMap::from([("BTCUSDT".to_string(), dec!(2))]);
        publisher.publish(PriceSnapshot::new(spot, HashMap::new(), Utc::now()));

        assert_eq!(held.price(InstrumentClass::Spot, "BTCUSDT"), Some(dec!(1)));
        assert_eq!(
            reader.latest().price(InstrumentClass::Spot, "BTCUSDT"),
            Some(dec!(2))
        );
    }

    #[test]
    fn test_freshness_follows_capture_time() {
        let now = Utc::now();
        let max_age = chrono::Duration::seconds(30);
        assert!(!PriceSnapshot::default().is_fresh(now, max_age));

        let snapshot = PriceSnapshot::new(HashMap::new(), HashMap::new(), now - max_age);
        assert_eq!(snapshot.age(now), Some(max_age));
        assert!(snapshot.is_fresh(now, max_age));
        assert!(!snapshot.is_fresh(now + chrono::Duration::seconds(1), max_age));
    }

    #[tokio::test]
    async fn test_refresh_publishes_both_classes() {
        let mock = MockExchange::new();
        mock.set_price(InstrumentClass::Spot, "SOLUSDT", dec!(140));
        mock.set_price(InstrumentClass::Linear, "SOLUSDT", dec!(140.5));
        let exchange: SharedExchangeClient = Arc::new(mock);
        let (publisher, reader) = price_channel();
        let metrics = EngineMetrics::new();

        assert!(refresh_prices(&exchange, &publisher, &metrics, Utc::now()).await);

        let snapshot = reader.latest();
        assert_eq!(snapshot.price(InstrumentClass::Linear, "SOLUSDT"), Some(dec!(140.5)));
        assert_eq!(metrics.snapshot().price_refreshes, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_previous_snapshot() {
        let mock = MockExchange::new();
        mock.set_price(InstrumentClass::Spot, "SOLUSDT", dec!(140));
        mock.set_price(InstrumentClass::Linear, "SOLUSDT", dec!(140));
        let mock = Arc::new(mock);
        let exchange: SharedExchangeClient = mock.clone();
        let (publisher, reader) = price_channel();
        let metrics = EngineMetrics::new();

        assert!(refresh_prices(&exchange, &publisher, &metrics, Utc::now()).await);

        mock.set_price(InstrumentClass::Spot, "SOLUSDT", dec!(150));
        mock.fail_tickers(InstrumentClass::Linear);
        assert!(!refresh_prices(&exchange, &publisher, &metrics, Utc::now()).await);

        assert_eq!(
            reader.latest().price(InstrumentClass::Spot, "SOLUSDT"),
            Some(dec!(140))
        );
        assert_eq!(metrics.snapshot().price_refresh_failures, 1);
    }
}
