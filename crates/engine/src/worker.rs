//! Periodic workers and their supervision.

use crate::context::EngineContext;
use crate::price_cache::{refresh_prices, PricePublisher};
use crate::router::SignalRouter;
use crate::{reconciler, take_profit};
use chrono::Utc;
use model::Signal;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// The independently schedulable units of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    PriceRefresh,
    CatalogRefresh,
    SignalDispatch,
    Reconcile,
    TakeProfit,
}

impl WorkerKind {
    pub const ALL: [WorkerKind; 5] = [
        WorkerKind::PriceRefresh,
        WorkerKind::CatalogRefresh,
        WorkerKind::SignalDispatch,
        WorkerKind::Reconcile,
        WorkerKind::TakeProfit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PriceRefresh => "price-refresh",
            Self::CatalogRefresh => "catalog-refresh",
            Self::SignalDispatch => "signal-dispatch",
            Self::Reconcile => "reconcile",
            Self::TakeProfit => "take-profit",
        }
    }

    /// Workers whose in-process state this worker reads.
    pub fn requires(self) -> &'static [WorkerKind] {
        match self {
            Self::SignalDispatch | Self::TakeProfit => {
                &[WorkerKind::PriceRefresh, WorkerKind::CatalogRefresh]
            }
            Self::PriceRefresh | Self::CatalogRefresh | Self::Reconcile => &[],
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown worker: {s}"))
    }
}

/// Call `tick` every `period` until shutdown is signalled.
///
/// A tick that overruns its period delays the next one instead of queueing
/// a burst. The first tick fires immediately.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(worker = name, period_ms = period.as_millis() as u64, "Worker started");

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            _ = interval.tick() => {
                tick().await;
            }
        }
    }

    info!(worker = name, "Worker stopped");
}

/// Wait for every worker, logging the ones that panicked.
pub async fn supervise(handles: Vec<(WorkerKind, JoinHandle<()>)>) {
    let (kinds, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let results = futures_util::future::join_all(handles).await;

    for (kind, result) in kinds.into_iter().zip(results) {
        match result {
            Ok(()) => info!(worker = %kind, "Worker exited"),
            Err(e) if e.is_panic() => error!(worker = %kind, "Worker panicked"),
            Err(e) => error!(worker = %kind, error = %e, "Worker aborted"),
        }
    }
}

/// Spawns workers over one shared context.
pub struct WorkerSet {
    ctx: EngineContext,
    publisher: Arc<PricePublisher>,
    signals: Option<mpsc::Receiver<Signal>>,
    shutdown: watch::Receiver<bool>,
}

impl WorkerSet {
    pub fn new(
        ctx: EngineContext,
        publisher: PricePublisher,
        signals: mpsc::Receiver<Signal>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            publisher: Arc::new(publisher),
            signals: Some(signals),
            shutdown,
        }
    }

    /// Spawn the requested workers plus the ones they read from, each once.
    pub fn spawn_all(&mut self, requested: &[WorkerKind]) -> Vec<(WorkerKind, JoinHandle<()>)> {
        let wanted: Vec<WorkerKind> = WorkerKind::ALL
            .into_iter()
            .filter(|kind| {
                requested
                    .iter()
                    .any(|r| r == kind || r.requires().contains(kind))
            })
            .collect();

        wanted
            .into_iter()
            .filter_map(|kind| self.spawn(kind).map(|handle| (kind, handle)))
            .collect()
    }

    /// Spawn one worker. The signal worker can only be spawned once.
    pub fn spawn(&mut self, kind: WorkerKind) -> Option<JoinHandle<()>> {
        let shutdown = self.shutdown.clone();
        let config = self.ctx.config.clone();

        let handle = match kind {
            WorkerKind::PriceRefresh => {
                let ctx = self.ctx.clone();
                let publisher = self.publisher.clone();
                tokio::spawn(run_periodic(
                    kind.as_str(),
                    config.price_refresh_interval,
                    shutdown,
                    move || {
                        let ctx = ctx.clone();
                        let publisher = publisher.clone();
                        async move {
                            refresh_prices(&ctx.exchange, &publisher, &ctx.metrics, Utc::now()).await;
                        }
                    },
                ))
            }
            WorkerKind::CatalogRefresh => {
                let ctx = self.ctx.clone();
                tokio::spawn(run_periodic(
                    kind.as_str(),
                    config.catalog_refresh_interval,
                    shutdown,
                    move || {
                        let ctx = ctx.clone();
                        async move {
                            ctx.catalog.refresh(&ctx.exchange, Utc::now()).await;
                        }
                    },
                ))
            }
            WorkerKind::Reconcile => {
                let ctx = self.ctx.clone();
                tokio::spawn(run_periodic(
                    kind.as_str(),
                    config.reconcile_interval,
                    shutdown,
                    move || {
                        let ctx = ctx.clone();
                        async move {
                            if let Err(e) = reconciler::run_cycle(&ctx, Utc::now()).await {
                                error!(error = %e, "Reconciliation cycle failed");
                            }
                            ctx.locks.prune();
                        }
                    },
                ))
            }
            WorkerKind::TakeProfit => {
                let ctx = self.ctx.clone();
                tokio::spawn(run_periodic(
                    kind.as_str(),
                    config.take_profit_interval,
                    shutdown,
                    move || {
                        let ctx = ctx.clone();
                        async move {
                            if let Err(e) = take_profit::run_cycle(&ctx).await {
                                error!(error = %e, "Take-profit cycle failed");
                            }
                        }
                    },
                ))
            }
            WorkerKind::SignalDispatch => {
                let Some(signals) = self.signals.take() else {
                    warn!("Signal worker already running");
                    return None;
                };
                let router = SignalRouter::new(self.ctx.clone());
                tokio::spawn(router.run(signals, shutdown))
            }
        };

        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_worker_kind_parse() {
        assert_eq!("take-profit".parse::<WorkerKind>(), Ok(WorkerKind::TakeProfit));
        assert_eq!(" Reconcile ".parse::<WorkerKind>(), Ok(WorkerKind::Reconcile));
        assert!("market-maker".parse::<WorkerKind>().is_err());

        for kind in WorkerKind::ALL {
            assert_eq!(kind.to_string().parse::<WorkerKind>(), Ok(kind));
        }
    }

    #[tokio::test]
    async fn test_run_periodic_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let ticks = Arc::new(AtomicUsize::new(0));

        let handle = {
            let ticks = ticks.clone();
            tokio::spawn(run_periodic("test", Duration::from_millis(5), rx, move || {
                let ticks = ticks.clone();
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            }))
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_spawn_all_adds_required_workers() {
        use crate::testing::{spot_spec, Harness};
        use model::InstrumentClass;
        use rust_decimal_macros::dec;

        let h = Harness::new(vec![]);
        h.mock.set_price(InstrumentClass::Spot, "SOLUSDT", dec!(140));
        h.mock.set_instruments(InstrumentClass::Spot, vec![spot_spec("SOLUSDT")]);

        let (publisher, reader) = crate::price_cache::price_channel();
        let mut ctx = h.ctx.clone();
        ctx.prices = reader.clone();
        let (_signal_tx, signal_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut workers = WorkerSet::new(ctx.clone(), publisher, signal_rx, shutdown_rx);
        let handles = workers.spawn_all(&[WorkerKind::TakeProfit]);
        let kinds: Vec<WorkerKind> = handles.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![WorkerKind::PriceRefresh, WorkerKind::CatalogRefresh, WorkerKind::TakeProfit]
        );
        assert!(workers.spawn(WorkerKind::SignalDispatch).is_some());
        assert!(workers.spawn(WorkerKind::SignalDispatch).is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            reader.latest().price(InstrumentClass::Spot, "SOLUSDT"),
            Some(dec!(140))
        );
        assert!(ctx.catalog.spec(InstrumentClass::Spot, "SOLUSDT").is_some());

        shutdown_tx.send(true).unwrap();
        supervise(handles).await;
    }

    #[tokio::test]
    async fn test_supervise_survives_panic() {
        let ok = tokio::spawn(async {});
        let bad = tokio::spawn(async { panic!("boom") });

        supervise(vec![
            (WorkerKind::Reconcile, ok),
            (WorkerKind::TakeProfit, bad),
        ])
        .await;
    }
}
