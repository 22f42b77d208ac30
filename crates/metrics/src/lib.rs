use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe counters shared by every engine worker.
#[derive(Debug)]
pub struct EngineMetrics {
    // Counters
    signals_received: AtomicU64,
    orders_placed: AtomicU64,
    orders_rejected: AtomicU64,
    users_skipped: AtomicU64,
    price_refreshes: AtomicU64,
    price_refresh_failures: AtomicU64,
    reconcile_cycles: AtomicU64,
    fills_detected: AtomicU64,
    averaging_merged: AtomicU64,
    orphans_adopted: AtomicU64,
    stale_cancelled: AtomicU64,
    tp_activated: AtomicU64,
    tp_ratcheted: AtomicU64,

    // Timestamps
    inner: RwLock<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    start_time: Instant,
    last_price_refresh: Option<Instant>,
    last_reconcile: Option<Instant>,
    last_error_time: Option<Instant>,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            signals_received: AtomicU64::new(0),
            orders_placed: AtomicU64::new(0),
            orders_rejected: AtomicU64::new(0),
            users_skipped: AtomicU64::new(0),
            price_refreshes: AtomicU64::new(0),
            price_refresh_failures: AtomicU64::new(0),
            reconcile_cycles: AtomicU64::new(0),
            fills_detected: AtomicU64::new(0),
            averaging_merged: AtomicU64::new(0),
            orphans_adopted: AtomicU64::new(0),
            stale_cancelled: AtomicU64::new(0),
            tp_activated: AtomicU64::new(0),
            tp_ratcheted: AtomicU64::new(0),
            inner: RwLock::new(MetricsInner {
                start_time: Instant::now(),
                last_price_refresh: None,
                last_reconcile: None,
                last_error_time: None,
            }),
        }
    }

    // --- Increment methods ---

    pub fn inc_signals_received(&self) {
        self.signals_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orders_placed(&self) {
        self.orders_placed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orders_rejected(&self) {
        self.orders_rejected.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn add_users_skipped(&self, n: u64) {
        self.users_skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_price_refreshes(&self) {
        self.price_refreshes.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_price_refresh = Some(Instant::now());
    }

    pub fn inc_price_refresh_failures(&self) {
        self.price_refresh_failures.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_reconcile_cycles(&self) {
        self.reconcile_cycles.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_reconcile = Some(Instant::now());
    }

    pub fn add_fills_detected(&self, n: u64) {
        self.fills_detected.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_averaging_merged(&self, n: u64) {
        self.averaging_merged.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_orphans_adopted(&self, n: u64) {
        self.orphans_adopted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_stale_cancelled(&self, n: u64) {
        self.stale_cancelled.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_tp_activated(&self) {
        self.tp_activated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tp_ratcheted(&self) {
        self.tp_ratcheted.fetch_add(1, Ordering::Relaxed);
    }

    // --- Getter methods ---

    pub fn signals_received(&self) -> u64 {
        self.signals_received.load(Ordering::Relaxed)
    }

    pub fn orders_placed(&self) -> u64 {
        self.orders_placed.load(Ordering::Relaxed)
    }

    pub fn orders_rejected(&self) -> u64 {
        self.orders_rejected.load(Ordering::Relaxed)
    }

    pub fn users_skipped(&self) -> u64 {
        self.users_skipped.load(Ordering::Relaxed)
    }

    pub fn fills_detected(&self) -> u64 {
        self.fills_detected.load(Ordering::Relaxed)
    }

    pub fn tp_activated(&self) -> u64 {
        self.tp_activated.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.inner.read().start_time.elapsed().as_secs_f64()
    }

    pub fn secs_since_last_price_refresh(&self) -> Option<f64> {
        self.inner
            .read()
            .last_price_refresh
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_reconcile(&self) -> Option<f64> {
        self.inner
            .read()
            .last_reconcile
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_error(&self) -> Option<f64> {
        self.inner
            .read()
            .last_error_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    /// Generate a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            signals_received: self.signals_received(),
            orders_placed: self.orders_placed(),
            orders_rejected: self.orders_rejected(),
            users_skipped: self.users_skipped(),
            price_refreshes: self.price_refreshes.load(Ordering::Relaxed),
            price_refresh_failures: self.price_refresh_failures.load(Ordering::Relaxed),
            reconcile_cycles: self.reconcile_cycles.load(Ordering::Relaxed),
            fills_detected: self.fills_detected(),
            averaging_merged: self.averaging_merged.load(Ordering::Relaxed),
            orphans_adopted: self.orphans_adopted.load(Ordering::Relaxed),
            stale_cancelled: self.stale_cancelled.load(Ordering::Relaxed),
            tp_activated: self.tp_activated(),
            tp_ratcheted: self.tp_ratcheted.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
            secs_since_last_price_refresh: self.secs_since_last_price_refresh(),
            secs_since_last_reconcile: self.secs_since_last_reconcile(),
            secs_since_last_error: self.secs_since_last_error(),
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub signals_received: u64,
    pub orders_placed: u64,
    pub orders_rejected: u64,
    pub users_skipped: u64,
    pub price_refreshes: u64,
    pub price_refresh_failures: u64,
    pub reconcile_cycles: u64,
    pub fills_detected: u64,
    pub averaging_merged: u64,
    pub orphans_adopted: u64,
    pub stale_cancelled: u64,
    pub tp_activated: u64,
    pub tp_ratcheted: u64,
    pub uptime_secs: f64,
    pub secs_since_last_price_refresh: Option<f64>,
    pub secs_since_last_reconcile: Option<f64>,
    pub secs_since_last_error: Option<f64>,
}

/// Health status of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Prices are fresh.
    Healthy,
    /// Prices lag a few refresh periods behind.
    Degraded,
    /// No usable prices; every price-driven worker is idle.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

impl MetricsSnapshot {
    /// Refresh periods a snapshot may lag before it counts as stale.
    const STALE_PERIODS: f64 = 3.0;
    /// Refresh periods after which prices are considered lost.
    const UNHEALTHY_PERIODS: f64 = 10.0;

    /// Health derived from price freshness, given the refresh period.
    pub fn health_status(&self, price_refresh_secs: f64) -> HealthStatus {
        let stale = price_refresh_secs * Self::STALE_PERIODS;
        let unhealthy = price_refresh_secs * Self::UNHEALTHY_PERIODS;

        // Before the first refresh, judge by how long we have been waiting.
        let age = self
            .secs_since_last_price_refresh
            .unwrap_or(self.uptime_secs);

        if age > unhealthy {
            HealthStatus::Unhealthy
        } else if age > stale {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Engine Metrics ===")?;
        writeln!(f, "Uptime:              {:.1}s", self.uptime_secs)?;
        writeln!(f, "Signals received:    {}", self.signals_received)?;
        writeln!(f, "Orders placed:       {}", self.orders_placed)?;
        writeln!(f, "Orders rejected:     {}", self.orders_rejected)?;
        writeln!(f, "Users skipped:       {}", self.users_skipped)?;
        writeln!(
            f,
            "Price refreshes:     {} ({} failed)",
            self.price_refreshes, self.price_refresh_failures
        )?;
        writeln!(f, "Reconcile cycles:    {}", self.reconcile_cycles)?;
        writeln!(f, "Fills detected:      {}", self.fills_detected)?;
        writeln!(f, "Averaging merged:    {}", self.averaging_merged)?;
        writeln!(f, "Orphans adopted:     {}", self.orphans_adopted)?;
        writeln!(f, "Stale cancelled:     {}", self.stale_cancelled)?;
        writeln!(
            f,
            "Take-profits:        {} opened, {} ratcheted",
            self.tp_activated, self.tp_ratcheted
        )?;
        if let Some(secs) = self.secs_since_last_price_refresh {
            writeln!(f, "Since last prices:   {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_error {
            writeln!(f, "Since last error:    {:.1}s", secs)?;
        }
        Ok(())
    }
}

/// Shared handle to metrics.
pub type SharedMetrics = Arc<EngineMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(EngineMetrics::new())
}
