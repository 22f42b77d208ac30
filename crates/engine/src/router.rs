//! Signal routing: each parsed signal goes to exactly one engine.

use crate::context::EngineContext;
use crate::dca::{self, DcaReport};
use crate::dispatcher::{self, DispatchReport};
use crate::error::TradeError;
use chrono::Utc;
use model::Signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// New entries through the Signal Dispatcher.
    Entry,
    /// Enlarging existing positions through the DCA Engine.
    Averaging,
}

#[derive(Debug)]
pub enum RouteOutcome {
    Entry(DispatchReport),
    Averaging(DcaReport),
}

pub struct SignalRouter {
    ctx: EngineContext,
}

impl SignalRouter {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub fn route_for(&self, signal: &Signal) -> Route {
        if self.ctx.config.is_averaging_channel(signal.origin_channel) {
            Route::Averaging
        } else {
            Route::Entry
        }
    }

    /// Consume one signal.
    pub async fn handle(&self, signal: Signal) -> Result<RouteOutcome, TradeError> {
        let now = Utc::now();
        match self.route_for(&signal) {
            Route::Entry => dispatcher::dispatch(&self.ctx, &signal, now)
                .await
                .map(RouteOutcome::Entry),
            Route::Averaging => dca::average(&self.ctx, &signal, now)
                .await
                .map(RouteOutcome::Averaging),
        }
    }

    /// Handle signals until the sender is dropped or shutdown is signalled.
    pub async fn run(
        self,
        mut signals: mpsc::Receiver<Signal>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Signal router started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                signal = signals.recv() => {
                    let Some(signal) = signal else {
                        break;
                    };
                    let coin = signal.coin.clone();
                    let channel = signal.origin_channel;
                    if let Err(e) = self.handle(signal).await {
                        error!(coin = %coin, channel, error = %e, "Signal handling failed");
                    }
                }
            }
        }

        info!("Signal router stopped");
    }
}
