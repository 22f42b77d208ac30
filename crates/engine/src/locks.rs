//! Per-anchor mutual exclusion.
//!
//! Averaging merges and take-profit activation both rewrite an anchor's cost
//! basis or flags. Each takes the anchor's lock before reading the record,
//! so neither ever acts on a copy the other is about to replace.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct AnchorLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AnchorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and hold the lock of one anchor id.
    pub async fn lock(&self, anchor_id: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(anchor_id.to_string())
            .or_default()
            .clone();
        mutex.lock_owned().await
    }

    /// Drop locks nobody holds or waits for.
    pub fn prune(&self) {
        self.locks.retain(|_, m| Arc::strong_count(m) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_is_exclusive() {
        let locks = Arc::new(AnchorLocks::new());
        let guard = locks.lock("a").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock("a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = AnchorLocks::new();
        let _a = locks.lock("a").await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.lock("b"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = AnchorLocks::new();
        let held = locks.lock("held").await;
        drop(locks.lock("free").await);

        locks.prune();
        assert_eq!(locks.len(), 1);

        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
