//! Shared infrastructure used by every crate in the workspace.
//!
//! - **Logging**: `init_logging` installs the `tracing` subscriber
//! - **Environment**: Bybit endpoint selection (mainnet, testnet, demo)
//! - **Backoff**: exponential backoff with jitter for startup retries

mod backoff;
mod environment;

pub use backoff::ExponentialBackoff;
pub use environment::{BybitEnvironment, ParseEnvironmentError, DEMO_REST_BASE_URL};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// The filter is read from `RUST_LOG` and falls back to `info`. Calling this
/// twice is harmless; the second installation is ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
