//! Core execution types and utilities.
//!
//! This crate provides the venue-facing seam of the engine:
//!
//! - **Exchange client**: the `ExchangeClient` trait every venue adapter
//!   implements, with the `Account` it acts for
//! - **Order types**: `OrderRequest`, `AmendRequest`, and the normalized
//!   listings (`OpenOrder`, `FilledOrder`, `ExchangePosition`)
//! - **Client order ids**: `generate_client_order_id` builds the id every
//!   submitted order carries, which is also the local position key
//! - **Sizing**: turning a USDT budget into an exchange-legal quantity
//!
//! # Order Lifecycle
//!
//! 1. A caller sizes the order with `sizing::size_order`
//! 2. It generates a client order id and submits via `ExchangeClient::place_order`
//! 3. The acknowledgement only means "accepted"; fills are discovered later
//!    by polling `get_filled_orders` for the same id

mod correlation;
mod error;
mod exchange;
mod order;
pub mod sizing;

pub use correlation::{generate_client_order_id, parse_client_order_id, ClientOrderIdParts};
pub use error::ExchangeError;
pub use exchange::{Account, ExchangeClient, SharedExchangeClient};
pub use order::{
    AmendRequest, ExchangePosition, FilledOrder, OpenOrder, OrderAck, OrderRequest,
    TriggerDirection,
};
pub use sizing::SizingError;
