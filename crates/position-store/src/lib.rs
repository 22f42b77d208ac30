//! Persistence seam for positions and users.
//!
//! The engine only talks to [`PositionStore`] and [`UserStore`]. The
//! runner keeps positions in [`SqlitePositionStore`]; the in-memory
//! implementations back the engine tests.

mod error;
mod filter;
mod memory;
mod patch;
mod sqlite;
mod users;

pub use error::StoreError;
pub use filter::PositionFilter;
pub use memory::InMemoryPositionStore;
pub use patch::PositionPatch;
pub use sqlite::SqlitePositionStore;
pub use users::InMemoryUserStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{Position, User};
use std::sync::Arc;

/// Keyed position records.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Insert or replace the record with `position.id`.
    async fn upsert(&self, position: Position) -> Result<(), StoreError>;

    /// Apply `patch` to an existing record and return the result.
    async fn update(&self, id: &str, patch: PositionPatch) -> Result<Position, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Position>, StoreError>;

    /// Records matching every set field of `filter`, oldest first.
    async fn query(&self, filter: &PositionFilter) -> Result<Vec<Position>, StoreError>;

    /// Remove a record; removing a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Fold a filled averaging record into its anchor and delete it.
    ///
    /// Execution sums are added and the average price recomputed from them.
    /// Returns the updated anchor.
    async fn merge_averaging(
        &self,
        anchor_id: &str,
        averaging_id: &str,
    ) -> Result<Position, StoreError>;
}

/// Read access to users.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn all_users(&self) -> Result<Vec<User>, StoreError>;

    /// Users with a live subscription that have not paused trading.
    async fn active_users(&self, now: DateTime<Utc>) -> Result<Vec<User>, StoreError>;
}

pub type SharedPositionStore = Arc<dyn PositionStore>;
pub type SharedUserStore = Arc<dyn UserStore>;
