//! In-memory user directory.

use crate::{StoreError, UserStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use model::User;
use std::path::Path;

/// Users keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: DashMap<i64, User>,
}

impl InMemoryUserStore {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    /// Load a JSON array of users.
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let users: Vec<User> =
            serde_json::from_str(json).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Self::new(users))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        let store = Self::from_json_str(&json)?;
        tracing::info!(path = %path.display(), users = store.users.len(), "Users loaded");
        Ok(store)
    }

    /// Insert or replace a user.
    pub fn put(&self, user: User) {
        self.users.insert(user.id, user);
    }

    fn sorted(&self, keep: impl Fn(&User) -> bool) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|e| keep(e.value()))
            .map(|e| e.value().clone())
            .collect();
        users.sort_by_key(|u| u.id);
        users
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|e| e.value().clone()))
    }

    async fn all_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.sorted(|_| true))
    }

    async fn active_users(&self, now: DateTime<Utc>) -> Result<Vec<User>, StoreError> {
        Ok(self.sorted(|u| u.is_active(now)))
    }
}
