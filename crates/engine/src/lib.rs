//! Signal execution and reconciliation engine.
//!
//! This crate turns trading signals into exchange orders for many users and
//! keeps the local position records in line with the exchange:
//!
//! - **Signal Dispatcher**: one signal into a batch of per-user entries
//! - **DCA Engine**: enlarges filled positions on adverse moves
//! - **Take-Profit Engine**: opens and trails exits once a position is in profit
//! - **Reconciler**: fills, averaging merges, orphans and stale orders
//! - **Price Cache** and **Instrument Catalog**: the market data all of the
//!   above read
//!
//! # Architecture
//!
//! ```text
//!  channel post                          ┌──────────────────┐
//!  ─────────────> SignalRouter ─────────>│ dispatcher / dca │──┐ place_order
//!                                        └──────────────────┘  │
//!  ┌───────────────┐  watch   ┌─────────────┐                   v
//!  │ price refresh │─────────>│ PriceReader │──> take_profit ─> ExchangeClient
//!  └───────────────┘          └─────────────┘                   │
//!                                                               │ fills, positions
//!  ┌───────────────┐   upsert / update / merge                  v
//!  │ PositionStore │<──────────────────────────────────── reconciler
//!  └───────────────┘
//! ```
//!
//! Workers share nothing but the [`EngineContext`]: the position store, the
//! price channel and the catalog.
//!
//! # Usage
//!
//! ```rust,ignore
//! let (publisher, reader) = price_channel();
//! let ctx = EngineContext::new(exchange, positions, users, reader, metrics, config);
//!
//! let mut workers = WorkerSet::new(ctx, publisher, signal_rx, shutdown_rx);
//! let handles = workers.spawn_all(&WorkerKind::ALL);
//! supervise(handles).await;
//! ```

mod catalog;
pub mod closer;
mod config;
mod context;
pub mod dca;
pub mod dispatcher;
mod error;
mod locks;
pub mod price_cache;
pub mod reconciler;
mod router;
pub mod take_profit;
mod worker;

#[cfg(test)]
mod testing;

pub use catalog::{CatalogRefresh, InstrumentCatalog};
pub use closer::{close_all, verify_credentials, CloseFailure, CloseReport, CredentialCheck};
pub use config::EngineConfig;
pub use context::EngineContext;
pub use dca::{AveragingOutcome, DcaReport};
pub use dispatcher::{DispatchReport, SkippedUser};
pub use error::TradeError;
pub use locks::AnchorLocks;
pub use price_cache::{price_channel, PricePublisher, PriceReader, PriceSnapshot};
pub use reconciler::{AccountFailure, ReconcileReport};
pub use router::{Route, RouteOutcome, SignalRouter};
pub use take_profit::TpReport;
pub use worker::{run_periodic, supervise, WorkerKind, WorkerSet};
