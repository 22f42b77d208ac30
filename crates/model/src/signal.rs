//! Trading signals and the channel post parser.

use crate::types::Side;

/// A directional call for one coin, consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub direction: Side,
    pub coin: String,
    pub origin_channel: i64,
}

impl Signal {
    pub fn new(direction: Side, coin: impl Into<String>, origin_channel: i64) -> Self {
        Self {
            direction,
            coin: coin.into(),
            origin_channel,
        }
    }

    /// Parse a channel post.
    ///
    /// Only the first line counts. Its first word must start with `buy` or
    /// `sell` (any case) and its last word names the coin, e.g.
    /// `"BUY now #SOL"` -> buy SOL. Anything else yields `None`.
    pub fn parse_channel_post(origin_channel: i64, text: &str) -> Option<Signal> {
        let first_line = text.lines().next()?;
        let mut words = first_line.split_whitespace();
        let first = words.next()?.to_lowercase();
        let last = words.last()?;

        let direction = if first.starts_with("buy") {
            Side::Buy
        } else if first.starts_with("sell") {
            Side::Sell
        } else {
            return None;
        };

        let coin = last
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_uppercase();
        if coin.is_empty() {
            return None;
        }

        Some(Signal::new(direction, coin, origin_channel))
    }
}
