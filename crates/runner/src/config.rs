//! Process configuration read from the environment.

use anyhow::{anyhow, Result};
use common::BybitEnvironment;
use engine::EngineConfig;
use model::Venue;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: BybitEnvironment,
    pub users_file: PathBuf,
    pub positions_db: PathBuf,
    pub averaging_channels: Vec<i64>,
    pub price_refresh: Duration,
    pub reconcile: Duration,
    pub take_profit: Duration,
    pub catalog_refresh: Duration,
    pub stale_order_minutes: i64,
    /// Oldest price snapshot decisions may be based on.
    pub max_price_age: Duration,
    /// Coins treated as new listings from startup.
    pub new_listings: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; unset keys take their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let environment = match lookup("BYBIT_ENVIRONMENT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow!("BYBIT_ENVIRONMENT: {e}"))?,
            None => BybitEnvironment::default(),
        };

        let stale_order_minutes: i64 = parse_or(&lookup, "STALE_ORDER_MINUTES", 300)?;
        if stale_order_minutes <= 0 {
            return Err(anyhow!("STALE_ORDER_MINUTES must be positive"));
        }

        Ok(Self {
            environment,
            users_file: lookup("USERS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("users.json")),
            positions_db: lookup("POSITIONS_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("positions.db")),
            averaging_channels: parse_list(&lookup, "AVERAGING_CHANNELS")?,
            price_refresh: secs(&lookup, "PRICE_REFRESH_SECS", 5)?,
            reconcile: secs(&lookup, "RECONCILE_SECS", 10)?,
            take_profit: secs(&lookup, "TAKE_PROFIT_SECS", 5)?,
            catalog_refresh: secs(&lookup, "CATALOG_REFRESH_SECS", 24 * 60 * 60)?,
            stale_order_minutes,
            max_price_age: secs(&lookup, "MAX_PRICE_AGE_SECS", 30)?,
            new_listings: parse_list(&lookup, "NEW_LISTINGS")?,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_stale_order_minutes(self.stale_order_minutes)
            .with_averaging_channels(self.averaging_channels.iter().copied())
            .with_price_refresh_interval(self.price_refresh)
            .with_reconcile_interval(self.reconcile)
            .with_take_profit_interval(self.take_profit)
            .with_catalog_refresh_interval(self.catalog_refresh)
            .with_max_price_age(self.max_price_age)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key}={raw}: {e}")),
        None => Ok(default),
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs: u64 = parse_or(lookup, key, default)?;
    if secs == 0 {
        return Err(anyhow!("{key} must be positive"));
    }
    Ok(Duration::from_secs(secs))
}

/// Comma-separated list; empty items are ignored.
fn parse_list<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| item.parse().map_err(|e| anyhow!("{key}: {item}: {e}")))
        .collect()
}

pub fn parse_venue(s: &str) -> Result<Venue, String> {
    Venue::ALL
        .into_iter()
        .find(|v| v.as_str() == s.trim().to_lowercase())
        .ok_or_else(|| format!("unknown venue: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.environment, BybitEnvironment::Mainnet);
        assert_eq!(s.users_file, PathBuf::from("users.json"));
        assert_eq!(s.positions_db, PathBuf::from("positions.db"));
        assert!(s.averaging_channels.is_empty());
        assert_eq!(s.price_refresh, Duration::from_secs(5));
        assert_eq!(s.stale_order_minutes, 300);

        let config = s.engine_config();
        assert_eq!(config.stale_order_after.num_minutes(), 300);
        assert_eq!(config.reconcile_interval, Duration::from_secs(10));
        assert_eq!(config.max_price_age.num_seconds(), 30);
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("BYBIT_ENVIRONMENT", "testnet"),
            ("AVERAGING_CHANNELS", "-1001, -1002,"),
            ("STALE_ORDER_MINUTES", "60"),
            ("NEW_LISTINGS", "pepe,WIF"),
            ("POSITIONS_DB", "/var/lib/engine/positions.db"),
            ("MAX_PRICE_AGE_SECS", "90"),
        ])
        .unwrap();

        assert_eq!(s.environment, BybitEnvironment::Testnet);
        assert_eq!(s.averaging_channels, vec![-1001, -1002]);
        assert_eq!(s.new_listings, vec!["pepe".to_string(), "WIF".to_string()]);
        assert!(s.engine_config().is_averaging_channel(-1002));
        assert_eq!(s.positions_db, PathBuf::from("/var/lib/engine/positions.db"));
        assert_eq!(s.engine_config().max_price_age.num_seconds(), 90);
    }

    #[test]
    fn test_invalid_values() {
        assert!(settings(&[("RECONCILE_SECS", "soon")]).is_err());
        assert!(settings(&[("PRICE_REFRESH_SECS", "0")]).is_err());
        assert!(settings(&[("AVERAGING_CHANNELS", "abc")]).is_err());
        assert!(settings(&[("BYBIT_ENVIRONMENT", "moon")]).is_err());
        assert!(settings(&[("MAX_PRICE_AGE_SECS", "0")]).is_err());
    }

    #[test]
    fn test_stale_order_minutes_must_be_positive() {
        for raw in ["0", "-5"] {
            let err = settings(&[("STALE_ORDER_MINUTES", raw)]).unwrap_err();
            assert!(err.to_string().contains("STALE_ORDER_MINUTES"), "{err}");
        }
        assert_eq!(settings(&[("STALE_ORDER_MINUTES", "1")]).unwrap().stale_order_minutes, 1);
    }

    #[test]
    fn test_parse_venue() {
        assert_eq!(parse_venue("Demo"), Ok(Venue::Demo));
        assert_eq!(parse_venue("real"), Ok(Venue::Real));
        assert!(parse_venue("paper").is_err());
    }
}
