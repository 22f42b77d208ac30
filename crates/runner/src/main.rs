mod config;

use anyhow::{Context, Result};
use bybit_rest::BybitRestClient;
use chrono::Utc;
use clap::Parser;
use common::ExponentialBackoff;
use config::{parse_venue, Settings};
use engine::{
    close_all, price_channel, price_cache::refresh_prices, supervise, verify_credentials,
    EngineContext, PricePublisher, WorkerKind, WorkerSet,
};
use execution_core::SharedExchangeClient;
use metrics::{create_metrics, SharedMetrics};
use model::{Signal, Venue};
use position_store::{InMemoryUserStore, SqlitePositionStore, UserStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Interval for periodic health status logging.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

const SIGNAL_CHANNEL_CAPACITY: usize = 64;

/// Startup attempts at loading the instrument catalog.
const WARM_UP_ATTEMPTS: u32 = 5;

#[derive(Debug, Parser)]
#[command(name = "signal-engine", about = "Bybit signal execution and reconciliation engine")]
struct Cli {
    /// Run only this worker; repeat for several. Runs every worker by default.
    #[arg(long = "worker", value_name = "NAME")]
    workers: Vec<WorkerKind>,

    /// Users file, overrides USERS_FILE.
    #[arg(long)]
    users: Option<PathBuf>,

    /// Check every user's API keys and exit.
    #[arg(long)]
    verify_credentials: bool,

    /// Close every position of this user and exit.
    #[arg(long, value_name = "USER_ID")]
    close_all: Option<i64>,

    /// Venue for --close-all.
    #[arg(long, value_parser = parse_venue, default_value = "demo")]
    venue: Venue,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    common::init_logging();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid configuration")?;
    let users_file = cli.users.clone().unwrap_or_else(|| settings.users_file.clone());

    info!(
        environment = %settings.environment,
        users_file = %users_file.display(),
        positions_db = %settings.positions_db.display(),
        averaging_channels = ?settings.averaging_channels,
        "Starting signal engine"
    );

    let users = Arc::new(
        InMemoryUserStore::from_json_file(&users_file)
            .with_context(|| format!("loading users from {}", users_file.display()))?,
    );
    let exchange: SharedExchangeClient = Arc::new(
        BybitRestClient::new(settings.environment).context("building exchange client")?,
    );
    let positions = Arc::new(
        SqlitePositionStore::open(&settings.positions_db)
            .with_context(|| format!("opening {}", settings.positions_db.display()))?,
    );
    let metrics = create_metrics();
    let (publisher, reader) = price_channel();

    let ctx = EngineContext::new(
        exchange,
        positions,
        users.clone(),
        reader,
        metrics.clone(),
        settings.engine_config(),
    );

    warm_up(&ctx, &publisher).await;
    for coin in &settings.new_listings {
        ctx.catalog.mark_new(coin, Utc::now());
    }

    if cli.verify_credentials {
        let mut invalid = 0;
        for user in users.all_users().await? {
            for venue in Venue::ALL {
                if user.credentials(venue).is_none() {
                    continue;
                }
                let check = verify_credentials(&ctx, &user, venue).await;
                if !check.is_valid() {
                    invalid += 1;
                }
                info!(owner_id = user.id, venue = %venue, result = ?check, "Credential check");
            }
        }
        info!(invalid, "Credential checks complete");
        return Ok(());
    }

    if let Some(owner_id) = cli.close_all {
        let report = close_all(&ctx, owner_id, cli.venue).await?;
        for failure in &report.failures {
            warn!(
                owner_id,
                position_id = %failure.position_id,
                symbol = %failure.symbol,
                reason = %failure.reason,
                "Could not close position"
            );
        }
        return Ok(());
    }

    let kinds = if cli.workers.is_empty() {
        WorkerKind::ALL.to_vec()
    } else {
        cli.workers.clone()
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

    // Spawn ctrl_c handler
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating shutdown");
            let _ = shutdown_tx_clone.send(true);
        }
    });

    spawn_health_reporter(metrics.clone(), settings.price_refresh, shutdown_tx.subscribe());

    if kinds.contains(&WorkerKind::SignalDispatch) {
        tokio::spawn(read_signals(signal_tx));
    } else {
        drop(signal_tx);
    }

    let mut workers = WorkerSet::new(ctx, publisher, signal_rx, shutdown_rx);
    let handles = workers.spawn_all(&kinds);
    info!(workers = ?handles.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), "Workers running");

    supervise(handles).await;

    // Print final metrics
    println!("\n{}", metrics.snapshot());

    info!("Shutdown complete");
    Ok(())
}

/// Load the catalog with retries and take a first price snapshot.
///
/// Gives up after a few attempts; the catalog worker keeps retrying.
async fn warm_up(ctx: &EngineContext, publisher: &PricePublisher) {
    let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30), 0.2)
        .with_max_attempts(WARM_UP_ATTEMPTS);

    loop {
        let report = ctx.catalog.refresh(&ctx.exchange, Utc::now()).await;
        if report.failed.is_empty() {
            break;
        }
        match backoff.next_delay() {
            Some(delay) => {
                warn!(
                    failed = ?report.failed,
                    attempt = backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "Catalog load incomplete, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                error!(failed = ?report.failed, "Starting with an incomplete catalog");
                break;
            }
        }
    }

    refresh_prices(&ctx.exchange, publisher, &ctx.metrics, Utc::now()).await;
}

/// Read `<channel_id> <post text>` lines from stdin and forward parsed signals.
async fn read_signals(signals: mpsc::Sender<Signal>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read signal input");
                break;
            }
        };

        let Some((channel, text)) = line.trim().split_once(char::is_whitespace) else {
            continue;
        };
        let Ok(channel) = channel.parse::<i64>() else {
            warn!(line = %line, "Expected '<channel_id> <text>'");
            continue;
        };

        match Signal::parse_channel_post(channel, text) {
            Some(signal) => {
                info!(channel, direction = %signal.direction, coin = %signal.coin, "Signal received");
                if signals.send(signal).await.is_err() {
                    break;
                }
            }
            None => info!(channel, "Post is not a signal"),
        }
    }

    info!("Signal input closed");
}

fn spawn_health_reporter(
    metrics: SharedMetrics,
    price_refresh: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_LOG_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = metrics.snapshot();
                    let status = snapshot.health_status(price_refresh.as_secs_f64());
                    info!(
                        status = %status,
                        signals = snapshot.signals_received,
                        orders = snapshot.orders_placed,
                        rejected = snapshot.orders_rejected,
                        fills = snapshot.fills_detected,
                        take_profits = snapshot.tp_activated,
                        "Health check"
                    );
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });
}
