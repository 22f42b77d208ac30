//! Instrument metadata and the new-listings set.

use chrono::{DateTime, Utc};
use execution_core::SharedExchangeClient;
use model::{coin_for_symbol, InstrumentClass, InstrumentSpec};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct CatalogInner {
    specs: HashMap<InstrumentClass, HashMap<String, InstrumentSpec>>,
    /// Classes that have completed their first load.
    baselined: HashSet<InstrumentClass>,
    /// Coin -> when it was first seen after the baseline.
    new_listings: HashMap<String, DateTime<Utc>>,
}

/// Outcome of one catalog refresh.
#[derive(Debug, Clone, Default)]
pub struct CatalogRefresh {
    pub updated: Vec<InstrumentClass>,
    pub failed: Vec<InstrumentClass>,
    pub new_coins: Vec<String>,
}

/// Tick and lot rules per (class, symbol), replaced per class on refresh.
///
/// Coins that show up in a refresh after a class's first load count as new
/// listings for `new_listing_window`.
#[derive(Debug)]
pub struct InstrumentCatalog {
    inner: RwLock<CatalogInner>,
    new_listing_window: chrono::Duration,
}

impl InstrumentCatalog {
    pub fn new(new_listing_window: chrono::Duration) -> Self {
        Self {
            inner: RwLock::new(CatalogInner::default()),
            new_listing_window,
        }
    }

    /// Reload both classes. A class whose fetch fails keeps its old specs.
    pub async fn refresh(&self, exchange: &SharedExchangeClient, now: DateTime<Utc>) -> CatalogRefresh {
        let mut report = CatalogRefresh::default();

        for class in InstrumentClass::ALL {
            match exchange.get_instruments(class).await {
                Ok(specs) => {
                    let count = specs.len();
                    let new_coins = self.replace_class(class, specs, now);
                    info!(class = %class, instruments = count, new = new_coins.len(), "Instrument catalog refreshed");
                    report.updated.push(class);
                    report.new_coins.extend(new_coins);
                }
                Err(e) => {
                    warn!(class = %class, error = %e, "Instrument refresh failed, keeping previous metadata");
                    report.failed.push(class);
                }
            }
        }

        report
    }

    /// Install the specs of one class and return the coins seen for the
    /// first time.
    pub fn replace_class(
        &self,
        class: InstrumentClass,
        specs: Vec<InstrumentSpec>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut inner = self.inner.write();

        let baselined = inner.baselined.contains(&class);
        let mut new_coins = Vec::new();
        if baselined {
            let known = inner.specs.get(&class);
            for spec in &specs {
                let seen = known.is_some_and(|k| k.contains_key(&spec.symbol));
                let coin = coin_for_symbol(&spec.symbol).to_string();
                if !seen && !inner.new_listings.contains_key(&coin) {
                    new_coins.push(coin);
                }
            }
        }

        for coin in &new_coins {
            inner.new_listings.insert(coin.clone(), now);
        }

        let window = self.new_listing_window;
        inner.new_listings.retain(|_, seen| now - *seen < window);

        let by_symbol = specs.into_iter().map(|s| (s.symbol.clone(), s)).collect();
        inner.specs.insert(class, by_symbol);
        inner.baselined.insert(class);

        new_coins
    }

    pub fn spec(&self, class: InstrumentClass, symbol: &str) -> Option<InstrumentSpec> {
        self.inner
            .read()
            .specs
            .get(&class)
            .and_then(|specs| specs.get(symbol))
            .cloned()
    }

    pub fn len(&self, class: InstrumentClass) -> usize {
        self.inner.read().specs.get(&class).map_or(0, HashMap::len)
    }

    pub fn is_new_listing(&self, coin: &str, now: DateTime<Utc>) -> bool {
        self.inner
            .read()
            .new_listings
            .get(&coin.to_uppercase())
            .is_some_and(|seen| now - *seen < self.new_listing_window)
    }

    /// Coins currently counted as new, sorted.
    pub fn new_listings(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut coins: Vec<String> = self
            .inner
            .read()
            .new_listings
            .iter()
            .filter(|(_, seen)| now - **seen < self.new_listing_window)
            .map(|(coin, _)| coin.clone())
            .collect();
        coins.sort();
        coins
    }

    /// Record a coin as listed at `listed_at`.
    pub fn mark_new(&self, coin: &str, listed_at: DateTime<Utc>) {
        self.inner
            .write()
            .new_listings
            .insert(coin.trim().to_uppercase(), listed_at);
    }
}

impl Default for InstrumentCatalog {
    fn default() -> Self {
        Self::new(chrono::Duration::days(180))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{spot_spec, MockExchange};
    use chrono::Duration;
    use std::sync::Arc;

    #[test]
    fn test_first_load_is_baseline() {
        let catalog = InstrumentCatalog::default();
        let now = Utc::now();

        let new = catalog.replace_class(
            InstrumentClass::Spot,
            vec![spot_spec("BTCUSDT"), spot_spec("SOLUSDT")],
            now,
        );

        assert!(new.is_empty());
        assert_eq!(catalog.len(InstrumentClass::Spot), 2);
        assert!(catalog.spec(InstrumentClass::Spot, "SOLUSDT").is_some());
        assert!(!catalog.is_new_listing("SOL", now));
    }

    #[test]
    fn test_later_arrivals_are_new_until_window_passes() {
        let catalog = InstrumentCatalog::new(Duration::days(180));
        let t0 = Utc::now();
        catalog.replace_class(InstrumentClass::Spot, vec![spot_spec("BTCUSDT")], t0);

        let new = catalog.replace_class(
            InstrumentClass::Spot,
            vec![spot_spec("BTCUSDT"), spot_spec("XYZUSDT")],
            t0 + Duration::days(1),
        );
        assert_eq!(new, vec!["XYZ".to_string()]);
        assert!(catalog.is_new_listing("xyz", t0 + Duration::days(2)));
        assert!(!catalog.is_new_listing("BTC", t0 + Duration::days(2)));

        let later = t0 + Duration::days(182);
        assert!(!catalog.is_new_listing("XYZ", later));

        catalog.replace_class(
            InstrumentClass::Spot,
            vec![spot_spec("BTCUSDT"), spot_spec("XYZUSDT")],
            later,
        );
        assert!(catalog.new_listings(later).is_empty());
    }

    #[tokio::test]
    async fn test_failed_class_keeps_previous_specs() {
        let mock = Arc::new(MockExchange::new());
        mock.set_instruments(InstrumentClass::Spot, vec![spot_spec("SOLUSDT")]);
        mock.set_instruments(InstrumentClass::Linear, vec![spot_spec("SOLUSDT")]);
        let exchange: SharedExchangeClient = mock.clone();
        let catalog = InstrumentCatalog::default();

        let report = catalog.refresh(&exchange, Utc::now()).await;
        assert_eq!(report.updated.len(), 2);

        mock.fail_instruments(InstrumentClass::Linear);
        let report = catalog.refresh(&exchange, Utc::now()).await;

        assert_eq!(report.failed, vec![InstrumentClass::Linear]);
        assert!(catalog.spec(InstrumentClass::Linear, "SOLUSDT").is_some());
    }

    #[test]
    fn test_mark_new() {
        let catalog = InstrumentCatalog::default();
        let now = Utc::now();
        catalog.mark_new(" pepe ", now);
        assert_eq!(catalog.new_listings(now), vec!["PEPE".to_string()]);
    }
}
