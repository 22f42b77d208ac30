//! Client order ids.
//!
//! Every order is submitted with a client order id of the form
//! `{owner}_{venue}_{class}_{12 hex}`. The id is the local position key, so
//! a listing from the exchange can be matched to a record without any other
//! lookup, and the owner and venue can be recovered from the id alone.

use model::{InstrumentClass, Venue};
use uuid::Uuid;

/// Length of the random suffix.
const SUFFIX_LEN: usize = 12;

/// Generate a unique client order id for one order.
pub fn generate_client_order_id(owner_id: i64, venue: Venue, class: InstrumentClass) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}",
        owner_id,
        venue.as_str(),
        class.category(),
        &uuid[..SUFFIX_LEN]
    )
}

/// Decoded fields of a client order id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOrderIdParts {
    pub owner_id: i64,
    pub venue: Venue,
    pub class: InstrumentClass,
}

/// Decode an id produced by [`generate_client_order_id`].
///
/// Returns `None` for ids placed by anything else (manual orders, other bots).
pub fn parse_client_order_id(id: &str) -> Option<ClientOrderIdParts> {
    let mut parts = id.splitn(4, '_');
    let owner_id = parts.next()?.parse().ok()?;
    let venue = match parts.next()? {
        "demo" => Venue::Demo,
        "real" => Venue::Real,
        _ => return None,
    };
    let class = match parts.next()? {
        "spot" => InstrumentClass::Spot,
        "linear" => InstrumentClass::Linear,
        _ => return None,
    };
    let suffix = parts.next()?;
    if suffix.len() != SUFFIX_LEN || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(ClientOrderIdParts {
        owner_id,
        venue,
        class,
    })
}
