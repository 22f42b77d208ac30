//! Domain types shared by every crate in the workspace.

mod instrument;
mod position;
mod signal;
mod types;
mod user;

pub use instrument::InstrumentSpec;
pub use position::Position;
pub use signal::Signal;
pub use types::{InstrumentClass, PositionKind, Side, Venue};
pub use user::{TradingPairs, User};

/// Quote currency every traded symbol is settled in.
pub const QUOTE_COIN: &str = "USDT";

/// Exchange symbol for a coin, e.g. `sol` -> `SOLUSDT`.
pub fn symbol_for_coin(coin: &str) -> String {
    format!("{}{}", coin.trim().to_uppercase(), QUOTE_COIN)
}

/// Base coin of a USDT symbol, e.g. `SOLUSDT` -> `SOL`.
pub fn coin_for_symbol(symbol: &str) -> &str {
    symbol.strip_suffix(QUOTE_COIN).unwrap_or(symbol)
}
